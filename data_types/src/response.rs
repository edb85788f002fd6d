//! Tabular query results as the database reports them.

use crate::{parse_rfc3339, Cell};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One group of rows sharing a fixed tag assignment (a subtable).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Measurement name.
    #[serde(default)]
    pub name: String,

    /// Group-by tag assignment identifying this subtable. Sorted by key so
    /// the rendering order is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    /// Column names; column 0 is `time`.
    #[serde(default)]
    pub columns: Vec<String>,

    /// Row-major values; each row's positional types match `columns`.
    #[serde(default)]
    pub values: Vec<Vec<Cell>>,

    /// Set by the database when the series was cut short by chunking.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

/// A user-facing message attached to a statement result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Severity label.
    #[serde(default)]
    pub level: String,
    /// Message body.
    #[serde(default)]
    pub text: String,
}

/// The result of one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Statement index within the submitted query text.
    #[serde(default)]
    pub statement_id: i64,

    /// Subtables of this result.
    #[serde(default)]
    pub series: Vec<Series>,

    /// Informational messages, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,

    /// Statement-level error.
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A list of statement results, the top-level shape of the database's JSON
/// response and of everything the codec and coordinator pass around.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Per-statement results.
    #[serde(default)]
    pub results: Vec<QueryResult>,

    /// Response-level error.
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Build a single-statement response from a list of series.
    pub fn from_series(series: Vec<Series>) -> Self {
        Self {
            results: vec![QueryResult {
                statement_id: 0,
                series,
                messages: None,
                error: None,
            }],
            error: None,
        }
    }

    /// All series across all statements, in order.
    pub fn all_series(&self) -> impl Iterator<Item = &Series> {
        self.results.iter().flat_map(|r| r.series.iter())
    }

    /// A response is empty when it carries no series or only valueless ones.
    pub fn is_empty(&self) -> bool {
        !self.all_series().any(|s| !s.values.is_empty())
    }

    /// Number of subtables.
    pub fn num_tables(&self) -> i64 {
        self.all_series().count() as i64
    }

    /// First error found at the response or statement level.
    pub fn error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }

    /// Rewrite column 0 of every series to epoch-second integers.
    ///
    /// Depending on the `epoch` query parameter the database reports times as
    /// RFC3339 strings or integers; callers at the ingress boundary invoke
    /// this once so the rest of the pipeline only ever sees `Cell::Int64`
    /// timestamps.
    pub fn normalize_time_column(&mut self) {
        for result in &mut self.results {
            for series in &mut result.series {
                for row in &mut series.values {
                    if let Some(cell) = row.first_mut() {
                        if let Cell::Str(text) = cell {
                            if let Ok(seconds) = parse_rfc3339(text) {
                                *cell = Cell::Int64(seconds);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Legacy text rendering: one `SCHEMA` line per series (columns then
    /// `tag=value` pairs), CRLF-separated rows with `_` placeholders for
    /// nulls, terminated by `end`. Empty responses render as
    /// `empty response`.
    pub fn to_text(&self) -> String {
        if self.is_empty() {
            return "empty response".to_string();
        }

        let mut out = String::new();
        for series in self.all_series() {
            out.push_str("SCHEMA ");
            for column in &series.columns {
                out.push_str(column);
                out.push(' ');
            }
            for (key, value) in &series.tags {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push(' ');
            }
            out.push_str("\r\n");
            for row in &series.values {
                for cell in row {
                    out.push_str(&cell.render());
                    out.push(' ');
                }
                out.push_str("\r\n");
            }
        }
        out.push_str("end");
        out
    }
}
