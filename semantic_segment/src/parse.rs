//! From query text to [`ParsedQuery`].
//!
//! The query language is SQL with time predicates plus a few spellings a
//! stock SQL grammar does not know (`db..measurement` qualifiers, duration
//! literals inside `GROUP BY time(...)`). The group-by clause is therefore
//! split off textually before the rest of the statement goes through
//! `sqlparser`.

use crate::duration::parse_duration;
use crate::{Error, Result};
use data_types::{parse_rfc3339, DataType, TimeRange};
use schema_catalog::SchemaCatalog;
use snafu::ResultExt;
use sqlparser::{
    ast::{self, Expr, FunctionArg, FunctionArgExpr, SelectItem, SetExpr, Statement, TableFactor},
    dialect::GenericDialect,
    parser::Parser,
};
use std::fmt;
use std::sync::Arc;

/// Comparison operator of a tag predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TagOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
}

impl TagOp {
    /// Canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
        }
    }
}

impl fmt::Display for TagOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate over an indexed tag column; quotes around the value are
/// stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPredicate {
    /// Tag key.
    pub key: String,
    /// `=` or `!=`, preserved.
    pub op: TagOp,
    /// Literal value without quotes.
    pub value: String,
}

impl TagPredicate {
    /// `key=value` / `key!=value` as it appears inside a conjunction.
    pub fn render(&self) -> String {
        format!("{}{}{}", self.key, self.op, self.value)
    }
}

/// Comparison operator of a field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `>=`
    GtEq,
    /// `>`
    Gt,
}

impl CompareOp {
    /// Canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::GtEq => ">=",
            Self::Gt => ">",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate literal before canonical rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateLiteral {
    /// Integer-spelled number.
    Int(i64),
    /// Float-spelled number.
    Float(f64),
    /// Quoted string.
    Str(String),
    /// Boolean keyword.
    Bool(bool),
}

impl PredicateLiteral {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A predicate over a field column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    /// Field name.
    pub field: String,
    /// Comparison operator, preserved.
    pub op: CompareOp,
    /// The literal as written.
    pub literal: PredicateLiteral,
    /// Declared type: the catalog's field type when the field is known,
    /// otherwise inferred from the literal's spelling.
    pub datatype: DataType,
}

impl FieldPredicate {
    /// Canonical fragment `name{op}literal[type]`, whitespace-free, with the
    /// literal normalized: float64 literals carry exactly three decimals so
    /// `> 90` and `> 90.0` agree, string literals keep their quotes.
    pub fn render(&self) -> String {
        let literal = match (self.datatype, &self.literal) {
            (DataType::Float64, lit) => match lit.as_f64() {
                Some(v) => format!("{:.3}", v),
                None => lit_text(lit),
            },
            (DataType::Int64, PredicateLiteral::Float(v)) => format!("{}", *v as i64),
            (_, lit) => lit_text(lit),
        };
        format!("{}{}{}[{}]", self.field, self.op, literal, self.datatype)
    }

    /// The predicate as a SQL condition, for residual query construction.
    pub fn to_condition(&self) -> String {
        let literal = match &self.literal {
            PredicateLiteral::Str(s) => format!("'{}'", s),
            other => lit_text(other),
        };
        format!("{} {} {}", self.field, self.op, literal)
    }
}

fn lit_text(lit: &PredicateLiteral) -> String {
    match lit {
        PredicateLiteral::Int(v) => v.to_string(),
        PredicateLiteral::Float(v) => v.to_string(),
        PredicateLiteral::Str(v) => format!("'{}'", v),
        PredicateLiteral::Bool(v) => v.to_string(),
    }
}

/// A selected field with its resolved datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryField {
    /// Field (or, for bare wildcards, tag) name.
    pub name: String,
    /// Resolved datatype; unknown names degrade to string.
    pub datatype: DataType,
}

/// Everything the coordinator needs to know about one query.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Measurement selected from.
    pub measurement: String,
    /// Selected fields in canonical order (syntactic, or sorted for
    /// wildcard selections). `time` is implicit and not listed.
    pub fields: Vec<QueryField>,
    /// Aggregation function, lowercased, when the projection applies one.
    pub aggregation: Option<String>,
    /// `GROUP BY time(...)` bucket in nanoseconds.
    pub interval_nanos: Option<i64>,
    /// Tag predicates, sorted by rendering.
    pub tag_predicates: Vec<TagPredicate>,
    /// Field predicates in syntactic order.
    pub field_predicates: Vec<FieldPredicate>,
    /// Group-by tag keys, sorted; `time(...)` buckets are not listed here.
    pub group_by_tags: Vec<String>,
    /// Normalized half-open start bound.
    pub time_start: Option<i64>,
    /// Normalized half-open end bound.
    pub time_end: Option<i64>,
    /// The raw projection text between `SELECT` and `FROM`, kept for
    /// residual query reconstruction.
    pub select_text: String,
}

impl ParsedQuery {
    /// The query's half-open time window, when both bounds are present.
    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.time_start, self.time_end) {
            (Some(start), Some(end)) => Some(TimeRange::new(start, end)),
            _ => None,
        }
    }
}

/// Derives [`ParsedQuery`] and canonical segments, consulting the schema
/// catalog to split tag predicates from field predicates and to expand
/// wildcards. Stateless across calls.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    catalog: Arc<SchemaCatalog>,
}

impl QueryAnalyzer {
    /// Analyzer over the given catalog.
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    /// The catalog this analyzer consults.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Parse one query.
    pub fn parse(&self, query: &str) -> Result<ParsedQuery> {
        let (head, group_tail) = split_group_by(query);
        let (interval_nanos, mut group_by_tags) = match group_tail {
            Some(tail) => parse_group_clause(&tail)?,
            None => (None, vec![]),
        };
        group_by_tags.sort();

        let head = strip_database_qualifier(&head);
        let statements =
            Parser::parse_sql(&GenericDialect {}, &head).context(crate::ParseSnafu)?;
        let select = match statements.into_iter().next() {
            Some(Statement::Query(query)) => match *query.body {
                SetExpr::Select(select) => select,
                _ => return Err(Error::NotASelect),
            },
            _ => return Err(Error::NotASelect),
        };

        let measurement = measurement_name(&select.from)?;
        if !self.catalog.has_measurement(&measurement) {
            return Err(Error::SchemaMissing { measurement });
        }

        let (fields, aggregation) = self.resolve_projection(&measurement, &select.projection);

        let mut conditions = Conditions::default();
        if let Some(selection) = &select.selection {
            self.collect_conditions(&measurement, selection, &mut conditions)?;
        }
        conditions.tag_predicates.sort_by_key(TagPredicate::render);

        Ok(ParsedQuery {
            measurement,
            fields,
            aggregation,
            interval_nanos,
            tag_predicates: conditions.tag_predicates,
            field_predicates: conditions.field_predicates,
            group_by_tags,
            time_start: conditions.time_start,
            time_end: conditions.time_end,
            select_text: select_text(query).unwrap_or_default(),
        })
    }

    /// The canonical full segment of a parsed query.
    pub fn segment(&self, parsed: &ParsedQuery) -> String {
        crate::canonical::integrated_segment(parsed, &self.catalog)
    }

    /// One segment per subtable, in canonical subtable order.
    pub fn subtable_segments(&self, parsed: &ParsedQuery) -> Vec<String> {
        crate::canonical::subtable_conjunctions(parsed, &self.catalog)
            .into_iter()
            .map(|conjunction| {
                crate::canonical::separate_segment_text(parsed, &conjunction)
            })
            .collect()
    }

    /// The query template: time literals replaced by `?`, bounds ordered
    /// `>=` before `<`.
    pub fn template(&self, query: &str) -> String {
        crate::template::query_template(query)
    }

    fn resolve_projection(
        &self,
        measurement: &str,
        projection: &[SelectItem],
    ) -> (Vec<QueryField>, Option<String>) {
        let mut names: Vec<String> = vec![];
        let mut aggregation: Option<String> = None;
        let mut bare_wildcard = false;
        let mut aggregated_wildcard = false;

        for item in projection {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    collect_projection_expr(
                        expr,
                        &mut names,
                        &mut aggregation,
                        &mut aggregated_wildcard,
                    );
                }
                SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {
                    bare_wildcard = true;
                }
            }
        }

        if aggregated_wildcard || (bare_wildcard && aggregation.is_some()) {
            names = self.catalog.field_names_sorted(measurement);
        } else if bare_wildcard {
            names = self.catalog.column_names_sorted(measurement);
        }

        let fields = names
            .into_iter()
            .map(|name| {
                let datatype = if self.catalog.is_tag(measurement, &name) {
                    DataType::Str
                } else {
                    self.catalog
                        .field_type(measurement, &name)
                        .unwrap_or(DataType::Str)
                };
                QueryField { name, datatype }
            })
            .collect();
        (fields, aggregation)
    }

    fn collect_conditions(
        &self,
        measurement: &str,
        expr: &Expr,
        out: &mut Conditions,
    ) -> Result<()> {
        match expr {
            Expr::Nested(inner) => self.collect_conditions(measurement, inner, out),
            Expr::BinaryOp { left, op, right }
                if matches!(op, ast::BinaryOperator::And | ast::BinaryOperator::Or) =>
            {
                self.collect_conditions(measurement, left, out)?;
                self.collect_conditions(measurement, right, out)
            }
            Expr::BinaryOp { left, op, right } => {
                let op = compare_op(op).ok_or_else(|| Error::UnsupportedPredicate {
                    text: expr.to_string(),
                })?;
                let name = identifier_name(left).ok_or_else(|| Error::UnsupportedPredicate {
                    text: expr.to_string(),
                })?;

                if name.eq_ignore_ascii_case("time") {
                    out.apply_time_bound(op, time_literal(right)?, expr)?;
                } else if self.catalog.is_tag(measurement, &name) {
                    let op = match op {
                        CompareOp::Eq => TagOp::Eq,
                        CompareOp::NotEq => TagOp::NotEq,
                        _ => {
                            return Err(Error::UnsupportedPredicate {
                                text: expr.to_string(),
                            })
                        }
                    };
                    out.tag_predicates.push(TagPredicate {
                        key: name,
                        op,
                        value: string_literal(right)?,
                    });
                } else {
                    let literal = predicate_literal(right)?;
                    let datatype = self
                        .catalog
                        .field_type(measurement, &name)
                        .unwrap_or_else(|| inferred_type(&literal));
                    out.field_predicates.push(FieldPredicate {
                        field: name,
                        op,
                        literal,
                        datatype,
                    });
                }
                Ok(())
            }
            other => Err(Error::UnsupportedPredicate {
                text: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Conditions {
    tag_predicates: Vec<TagPredicate>,
    field_predicates: Vec<FieldPredicate>,
    time_start: Option<i64>,
    time_end: Option<i64>,
}

impl Conditions {
    /// Fold one comparison against `time` into the half-open
    /// `[start, end)` window.
    fn apply_time_bound(&mut self, op: CompareOp, t: i64, expr: &Expr) -> Result<()> {
        match op {
            CompareOp::GtEq => self.time_start = Some(t),
            CompareOp::Gt => self.time_start = Some(t + 1),
            CompareOp::Lt => self.time_end = Some(t),
            CompareOp::LtEq => self.time_end = Some(t + 1),
            CompareOp::Eq => {
                self.time_start = Some(t);
                self.time_end = Some(t + 1);
            }
            CompareOp::NotEq => {
                return Err(Error::UnsupportedPredicate {
                    text: expr.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn compare_op(op: &ast::BinaryOperator) -> Option<CompareOp> {
    match op {
        ast::BinaryOperator::Lt => Some(CompareOp::Lt),
        ast::BinaryOperator::LtEq => Some(CompareOp::LtEq),
        ast::BinaryOperator::Eq => Some(CompareOp::Eq),
        ast::BinaryOperator::NotEq => Some(CompareOp::NotEq),
        ast::BinaryOperator::GtEq => Some(CompareOp::GtEq),
        ast::BinaryOperator::Gt => Some(CompareOp::Gt),
        _ => None,
    }
}

fn identifier_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => idents.last().map(|i| i.value.clone()),
        Expr::Nested(inner) => identifier_name(inner),
        _ => None,
    }
}

fn time_literal(expr: &Expr) -> Result<i64> {
    match expr {
        Expr::Value(ast::Value::SingleQuotedString(text)) => {
            parse_rfc3339(text).context(crate::InvalidTimeSnafu)
        }
        Expr::Value(ast::Value::Number(text, _)) => {
            text.parse().map_err(|_| Error::UnsupportedPredicate {
                text: text.clone(),
            })
        }
        other => Err(Error::UnsupportedPredicate {
            text: other.to_string(),
        }),
    }
}

fn string_literal(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Value(ast::Value::SingleQuotedString(text)) => Ok(text.clone()),
        Expr::Value(ast::Value::Number(text, _)) => Ok(text.clone()),
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        other => Err(Error::UnsupportedPredicate {
            text: other.to_string(),
        }),
    }
}

fn predicate_literal(expr: &Expr) -> Result<PredicateLiteral> {
    match expr {
        Expr::Value(ast::Value::Number(text, _)) => parse_number(text),
        Expr::Value(ast::Value::SingleQuotedString(text)) => {
            Ok(PredicateLiteral::Str(text.clone()))
        }
        Expr::Value(ast::Value::Boolean(value)) => Ok(PredicateLiteral::Bool(*value)),
        Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("true") => {
            Ok(PredicateLiteral::Bool(true))
        }
        Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("false") => {
            Ok(PredicateLiteral::Bool(false))
        }
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr,
        } => match predicate_literal(expr)? {
            PredicateLiteral::Int(v) => Ok(PredicateLiteral::Int(-v)),
            PredicateLiteral::Float(v) => Ok(PredicateLiteral::Float(-v)),
            other => Err(Error::UnsupportedPredicate {
                text: format!("-{:?}", other),
            }),
        },
        other => Err(Error::UnsupportedPredicate {
            text: other.to_string(),
        }),
    }
}

fn parse_number(text: &str) -> Result<PredicateLiteral> {
    if text.contains('.') || text.contains('e') || text.contains('E') {
        text.parse()
            .map(PredicateLiteral::Float)
            .map_err(|_| Error::UnsupportedPredicate {
                text: text.to_string(),
            })
    } else {
        text.parse()
            .map(PredicateLiteral::Int)
            .map_err(|_| Error::UnsupportedPredicate {
                text: text.to_string(),
            })
    }
}

fn inferred_type(literal: &PredicateLiteral) -> DataType {
    match literal {
        PredicateLiteral::Int(_) => DataType::Int64,
        PredicateLiteral::Float(_) => DataType::Float64,
        PredicateLiteral::Str(_) => DataType::Str,
        PredicateLiteral::Bool(_) => DataType::Bool,
    }
}

fn collect_projection_expr(
    expr: &Expr,
    names: &mut Vec<String>,
    aggregation: &mut Option<String>,
    aggregated_wildcard: &mut bool,
) {
    match expr {
        Expr::Identifier(ident) => names.push(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => {
            if let Some(last) = idents.last() {
                names.push(last.value.clone());
            }
        }
        Expr::Function(function) => {
            if aggregation.is_none() {
                if let Some(name) = function.name.0.last() {
                    *aggregation = Some(name.value.to_lowercase());
                }
            }
            for arg in &function.args {
                match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(inner))
                    | FunctionArg::Named {
                        arg: FunctionArgExpr::Expr(inner),
                        ..
                    } => collect_projection_expr(expr_deref(inner), names, aggregation, aggregated_wildcard),
                    FunctionArg::Unnamed(FunctionArgExpr::Wildcard)
                    | FunctionArg::Named {
                        arg: FunctionArgExpr::Wildcard,
                        ..
                    } => *aggregated_wildcard = true,
                    _ => {}
                }
            }
        }
        Expr::Nested(inner) => {
            collect_projection_expr(inner, names, aggregation, aggregated_wildcard)
        }
        _ => {}
    }
}

fn expr_deref(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => expr_deref(inner),
        other => other,
    }
}

fn measurement_name(from: &[ast::TableWithJoins]) -> Result<String> {
    let factor = &from.first().ok_or(Error::NoMeasurement)?.relation;
    match factor {
        TableFactor::Table { name, .. } => name
            .0
            .last()
            .map(|ident| ident.value.clone())
            .ok_or(Error::NoMeasurement),
        _ => Err(Error::NoMeasurement),
    }
}

/// Split the raw query at its `GROUP BY` clause. The returned tail stops
/// before any `ORDER BY`/`LIMIT`/`OFFSET` suffix.
fn split_group_by(query: &str) -> (String, Option<String>) {
    match find_ci(query, " group by ") {
        Some(at) => {
            let head = query[..at].to_string();
            let mut tail = &query[at + " group by ".len()..];
            for stop in [" order by ", " limit ", " offset ", " slimit "] {
                if let Some(cut) = find_ci(tail, stop) {
                    tail = &tail[..cut];
                }
            }
            (head, Some(tail.trim().to_string()))
        }
        None => (query.to_string(), None),
    }
}

/// Parse the textual group-by clause into the `time(...)` bucket and the
/// list of grouping tags. `fill(...)` directives are ignored.
fn parse_group_clause(text: &str) -> Result<(Option<i64>, Vec<String>)> {
    let mut interval = None;
    let mut tags = vec![];
    for part in text.split(',') {
        let part = part.trim().trim_matches('"');
        if part.is_empty() {
            continue;
        }
        let lower = part.to_lowercase();
        if lower.starts_with("time(") {
            let inner = lower["time(".len()..]
                .trim_end_matches(')')
                .trim()
                .trim_matches('\'');
            interval = Some(parse_duration(inner)?);
        } else if lower.starts_with("fill(") {
            continue;
        } else {
            tags.push(part.to_string());
        }
    }
    Ok((interval, tags))
}

/// Collapse `database..measurement` qualifiers, which the SQL grammar does
/// not accept, to the bare measurement name.
fn strip_database_qualifier(query: &str) -> String {
    let mut out = query.to_string();
    while let Some(dots) = out.find("..") {
        let prefix_start = out[..dots]
            .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|i| i + 1)
            .unwrap_or(0);
        out.replace_range(prefix_start..dots + 2, "");
    }
    out
}

/// The raw text between `SELECT` and `FROM`.
fn select_text(query: &str) -> Option<String> {
    let select_at = find_ci(query, "select")?;
    let after_select = select_at + "select".len();
    let from_at = find_ci(&query[after_select..], " from ")?;
    Some(query[after_select..after_select + from_at].trim().to_string())
}

/// Byte offset of the first case-insensitive (ASCII) occurrence of
/// `needle`.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{analyzer, benchmark_catalog};

    #[test]
    fn parses_simple_query() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'",
            )
            .unwrap();

        assert_eq!(parsed.measurement, "cpu");
        assert_eq!(
            parsed.fields,
            vec![QueryField {
                name: "usage_guest".to_string(),
                datatype: DataType::Float64
            }]
        );
        assert_eq!(parsed.aggregation, None);
        assert_eq!(parsed.time_start, Some(1640995200));
        assert_eq!(parsed.time_end, Some(1640995220));
        assert_eq!(
            parsed.tag_predicates,
            vec![TagPredicate {
                key: "hostname".to_string(),
                op: TagOp::Eq,
                value: "host_0".to_string(),
            }]
        );
        assert!(parsed.field_predicates.is_empty());
        assert_eq!(parsed.select_text, "usage_guest");
    }

    #[test]
    fn normalizes_time_bounds_to_half_open() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT index FROM h2o_quality WHERE time > '2019-08-18T00:00:00Z' \
                 AND time <= '2019-08-18T00:30:00Z'",
            )
            .unwrap();
        assert_eq!(parsed.time_start, Some(1566086400 + 1));
        assert_eq!(parsed.time_end, Some(1566088200 + 1));
    }

    #[test]
    fn splits_tag_and_field_predicates() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT index FROM h2o_quality WHERE location='coyote_creek' \
                 AND randtag='2' AND index >= 50",
            )
            .unwrap();
        assert_eq!(
            parsed
                .tag_predicates
                .iter()
                .map(TagPredicate::render)
                .collect::<Vec<_>>(),
            vec!["location=coyote_creek", "randtag=2"]
        );
        assert_eq!(parsed.field_predicates.len(), 1);
        assert_eq!(parsed.field_predicates[0].render(), "index>=50[int64]");
    }

    #[test]
    fn negated_tags_and_negative_literals() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT water_level FROM h2o_feet WHERE location != 'santa_monica' \
                 AND water_level < -0.59 AND water_level > 9.95",
            )
            .unwrap();
        assert_eq!(
            parsed.tag_predicates[0].render(),
            "location!=santa_monica"
        );
        assert_eq!(
            parsed
                .field_predicates
                .iter()
                .map(FieldPredicate::render)
                .collect::<Vec<_>>(),
            vec![
                "water_level<-0.590[float64]",
                "water_level>9.950[float64]"
            ]
        );
    }

    #[test]
    fn catalog_type_beats_literal_spelling() {
        let analyzer = analyzer();
        for query in [
            "SELECT usage_user FROM cpu WHERE usage_user > 90",
            "SELECT usage_user FROM cpu WHERE usage_user > 90.0",
        ] {
            let parsed = analyzer.parse(query).unwrap();
            assert_eq!(
                parsed.field_predicates[0].render(),
                "usage_user>90.000[float64]",
                "query: {}",
                query
            );
        }
    }

    #[test]
    fn aggregation_and_interval() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT max(usage_user) FROM cpu WHERE hostname='host_6' AND \
                 time >= '2022-01-01T01:18:32Z' AND time < '2022-01-01T02:18:32Z' \
                 GROUP BY time(1m)",
            )
            .unwrap();
        assert_eq!(parsed.aggregation.as_deref(), Some("max"));
        assert_eq!(parsed.interval_nanos, Some(60 * 1_000_000_000));
        assert!(parsed.group_by_tags.is_empty());
    }

    #[test]
    fn group_by_tags_are_sorted_and_time_skipped() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT index FROM h2o_quality WHERE time >= '2019-08-18T00:00:00Z' \
                 GROUP BY randtag,location",
            )
            .unwrap();
        assert_eq!(parsed.group_by_tags, vec!["location", "randtag"]);

        let parsed = analyzer
            .parse("SELECT max(index) FROM h2o_quality GROUP BY time(12m),randtag,fill(none)")
            .unwrap();
        assert_eq!(parsed.group_by_tags, vec!["randtag"]);
        assert_eq!(parsed.interval_nanos, Some(720 * 1_000_000_000));
    }

    #[test]
    fn database_qualifier_is_stripped() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse("select usage_guest from test..cpu where hostname='host_0'")
            .unwrap();
        assert_eq!(parsed.measurement, "cpu");
    }

    #[test]
    fn wildcard_expands_sorted() {
        let analyzer = analyzer();
        let parsed = analyzer.parse("SELECT * FROM h2o_quality").unwrap();
        assert_eq!(
            parsed
                .fields
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>(),
            vec!["index", "location", "randtag"]
        );
        assert_eq!(parsed.fields[1].datatype, DataType::Str);

        let parsed = analyzer.parse("SELECT mean(*) FROM h2o_quality").unwrap();
        assert_eq!(parsed.aggregation.as_deref(), Some("mean"));
        assert_eq!(
            parsed
                .fields
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>(),
            vec!["index"]
        );
    }

    #[test]
    fn unknown_measurement_reports_schema_missing() {
        let analyzer = analyzer();
        let err = analyzer
            .parse("SELECT value FROM unknown_series WHERE time >= '2022-01-01T00:00:00Z'")
            .unwrap_err();
        assert!(matches!(err, Error::SchemaMissing { .. }), "{:?}", err);
    }

    #[test]
    fn epoch_second_time_literals() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse("SELECT usage_guest FROM cpu WHERE time >= 1640995200 AND time < 1640995220")
            .unwrap();
        assert_eq!(parsed.time_start, Some(1640995200));
        assert_eq!(parsed.time_end, Some(1640995220));
    }

    #[test]
    fn catalog_fixture_is_shared() {
        let catalog = benchmark_catalog();
        assert!(catalog.has_measurement("cpu"));
    }
}
