//! Primitive cell ↔ byte conversions.

use crate::{CellTypeMismatchSnafu, Result};
use data_types::{parse_rfc3339, Cell, DataType};
use snafu::ensure;

/// Fixed width of an encoded string slot.
pub const STRING_SLOT_LEN: usize = 25;

/// Encoded width of one column value.
pub fn column_width(datatype: DataType) -> usize {
    match datatype {
        DataType::Int64 | DataType::Float64 => 8,
        DataType::Bool => 1,
        DataType::Str => STRING_SLOT_LEN,
    }
}

/// Append the encoding of `cell` under the declared `datatype`.
///
/// Nulls encode as zero values. Integer cells widen into float columns;
/// RFC3339 strings are accepted in the leading time column (`column == 0`)
/// since the database may deliver timestamps either way.
pub fn encode_cell(cell: &Cell, datatype: DataType, column: usize, out: &mut Vec<u8>) -> Result<()> {
    match datatype {
        DataType::Bool => {
            let value = match cell {
                Cell::Null => false,
                Cell::Bool(value) => *value,
                other => return mismatch(other, datatype),
            };
            out.push(value as u8);
        }
        DataType::Int64 => {
            let value = match cell {
                Cell::Null => 0,
                Cell::Int64(value) => *value,
                Cell::Str(text) if column == 0 => match parse_rfc3339(text) {
                    Ok(seconds) => seconds,
                    Err(_) => return mismatch(cell, datatype),
                },
                other => return mismatch(other, datatype),
            };
            out.extend_from_slice(&value.to_le_bytes());
        }
        DataType::Float64 => {
            let value = match cell {
                Cell::Null => 0.0,
                Cell::Float64(value) => *value,
                Cell::Int64(value) => *value as f64,
                other => return mismatch(other, datatype),
            };
            out.extend_from_slice(&value.to_le_bytes());
        }
        DataType::Str => {
            let text = match cell {
                Cell::Null => "",
                Cell::Str(text) => text.as_str(),
                other => return mismatch(other, datatype),
            };
            let bytes = text.as_bytes();
            if bytes.len() >= STRING_SLOT_LEN {
                out.extend_from_slice(&bytes[..STRING_SLOT_LEN]);
            } else {
                out.extend_from_slice(bytes);
                out.extend(std::iter::repeat(0u8).take(STRING_SLOT_LEN - bytes.len()));
            }
        }
    }
    Ok(())
}

fn mismatch(cell: &Cell, datatype: DataType) -> Result<()> {
    CellTypeMismatchSnafu {
        value: cell.render(),
        datatype,
    }
    .fail()
}

/// Decode one value of `datatype` from the front of `bytes`.
///
/// The caller guarantees `bytes.len() >= column_width(datatype)`.
pub fn decode_cell(bytes: &[u8], datatype: DataType) -> Result<Cell> {
    ensure!(
        bytes.len() >= column_width(datatype),
        crate::CorruptSnafu {
            reason: format!("truncated {} value", datatype),
        }
    );
    let cell = match datatype {
        DataType::Bool => Cell::Bool(bytes[0] != 0),
        DataType::Int64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            Cell::Int64(i64::from_le_bytes(raw))
        }
        DataType::Float64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            Cell::Float64(f64::from_le_bytes(raw))
        }
        DataType::Str => {
            let slot = &bytes[..STRING_SLOT_LEN];
            let end = slot
                .iter()
                .rposition(|b| *b != 0)
                .map(|i| i + 1)
                .unwrap_or(0);
            Cell::Str(String::from_utf8_lossy(&slot[..end]).into_owned())
        }
    };
    Ok(cell)
}
