//! Typed row cells and the tagged numeric carrier.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Column datatypes the cache understands.
///
/// The database reports field types as `float`, `integer`, `string` and
/// `boolean`; those spellings normalize onto these four variants. Tags are
/// always [`DataType::Str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit IEEE float.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Str,
}

impl DataType {
    /// Canonical name as it appears inside a semantic segment, e.g.
    /// `usage_user[float64]`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Str => "string",
        }
    }

    /// Parse a datatype name, accepting both the canonical spellings and the
    /// ones `SHOW FIELD KEYS` reports.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "int64" | "integer" => Some(Self::Int64),
            "float64" | "float" => Some(Self::Float64),
            "bool" | "boolean" => Some(Self::Bool),
            "string" => Some(Self::Str),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A number whose integer-ness is preserved until a consumer decides
/// otherwise.
///
/// The database protocol delivers all numbers as JSON; decoding them eagerly
/// to `f64` would silently lose precision for large integers, so both the
/// JSON decoder and the byte codec carry this tagged form instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    /// An integer-valued number.
    Int64(i64),
    /// A float-valued number.
    Float64(f64),
}

impl Numeric {
    /// Widen to `f64`. Lossy for integers above 2^53.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int64(v) => *v as f64,
            Self::Float64(v) => *v,
        }
    }

    /// The integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            Self::Float64(_) => None,
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v),
        }
    }
}

/// One value in a result row.
///
/// Rows are heterogeneous: column 0 is always a timestamp, the remaining
/// columns follow the declared field types. `Null` marks values the database
/// did not report; the byte codec encodes those as zero values of the column
/// type and cannot restore the distinction.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Absent value.
    Null,
    /// Integer value (including epoch-second timestamps).
    Int64(i64),
    /// Float value.
    Float64(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    Str(String),
}

impl Cell {
    /// Is this the null cell?
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The numeric carrier, if this cell holds a number.
    pub fn numeric(&self) -> Option<Numeric> {
        match self {
            Self::Int64(v) => Some(Numeric::Int64(*v)),
            Self::Float64(v) => Some(Numeric::Float64(*v)),
            _ => None,
        }
    }

    /// Integer value, widening is never performed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        self.numeric().map(|n| n.as_f64())
    }

    /// String value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The datatype this cell would declare, `None` for null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Int64(_) => Some(DataType::Int64),
            Self::Float64(_) => Some(DataType::Float64),
            Self::Bool(_) => Some(DataType::Bool),
            Self::Str(_) => Some(DataType::Str),
        }
    }

    /// Text rendering used by [`Response::to_text`](crate::Response::to_text);
    /// nulls render as `_`.
    pub fn render(&self) -> String {
        match self {
            Self::Null => "_".to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Str(v) => v.clone(),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Int64(v) => serializer.serialize_i64(*v),
            Self::Float64(v) => serializer.serialize_f64(*v),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Str(v) => serializer.serialize_str(v),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CellVisitor;

        impl<'de> de::Visitor<'de> for CellVisitor {
            type Value = Cell;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("null, bool, number or string")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Cell, E> {
                Ok(Cell::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Cell, E> {
                Ok(Cell::Null)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Cell, E> {
                Ok(Cell::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cell, E> {
                Ok(Cell::Int64(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cell, E> {
                i64::try_from(v)
                    .map(Cell::Int64)
                    .map_err(|_| E::custom(format!("integer out of range: {}", v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Cell, E> {
                Ok(Cell::Float64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cell, E> {
                Ok(Cell::Str(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Cell, E> {
                Ok(Cell::Str(v))
            }
        }

        deserializer.deserialize_any(CellVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datatype_names_round_trip() {
        for dt in [DataType::Int64, DataType::Float64, DataType::Bool, DataType::Str] {
            assert_eq!(DataType::parse(dt.name()), Some(dt));
        }
    }

    #[test]
    fn datatype_accepts_database_spellings() {
        assert_eq!(DataType::parse("float"), Some(DataType::Float64));
        assert_eq!(DataType::parse("integer"), Some(DataType::Int64));
        assert_eq!(DataType::parse("boolean"), Some(DataType::Bool));
        assert_eq!(DataType::parse("decimal"), None);
    }

    #[test]
    fn numbers_keep_their_kind() {
        let cells: Vec<Cell> = serde_json::from_str(r#"[1629158400, 41.22, "ok", true, null]"#)
            .unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::Int64(1629158400),
                Cell::Float64(41.22),
                Cell::Str("ok".to_string()),
                Cell::Bool(true),
                Cell::Null,
            ]
        );
    }

    #[test]
    fn large_integers_do_not_go_through_f64() {
        let cells: Vec<Cell> = serde_json::from_str("[9007199254740993]").unwrap();
        assert_eq!(cells, vec![Cell::Int64(9007199254740993)]);
    }

    #[test]
    fn numeric_widening() {
        assert_eq!(Numeric::Int64(3).as_f64(), 3.0);
        assert_eq!(Numeric::Int64(3).as_i64(), Some(3));
        assert_eq!(Numeric::Float64(3.5).as_i64(), None);
    }

    #[test]
    fn render_null_as_placeholder() {
        assert_eq!(Cell::Null.render(), "_");
        assert_eq!(Cell::Str("host_0".to_string()).render(), "host_0");
    }
}
