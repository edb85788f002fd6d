//! Line-protocol construction for write requests.

use crate::{GzipSnafu, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;

/// A field value in line protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Float field.
    Float(f64),
    /// Integer field (serialized with the `i` suffix).
    Int(i64),
    /// Boolean field.
    Bool(bool),
    /// String field (serialized quoted and escaped).
    Str(String),
}

/// One data point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<i64>,
}

impl Point {
    /// A point in `measurement`.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            ..Default::default()
        }
    }

    /// Attach a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Attach a field.
    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Set the timestamp (interpreted under the batch's precision). Without
    /// one the server assigns its local time on arrival.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Render as one line of line protocol (no trailing newline).
    pub fn line(&self) -> String {
        let mut out = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            let _ = write!(out, ",{}={}", escape_tag(key), escape_tag(value));
        }
        out.push(' ');
        let mut first = true;
        for (key, value) in &self.fields {
            if !first {
                out.push(',');
            }
            first = false;
            let _ = write!(out, "{}=", escape_tag(key));
            match value {
                FieldValue::Float(v) => {
                    let _ = write!(out, "{}", v);
                }
                FieldValue::Int(v) => {
                    let _ = write!(out, "{}i", v);
                }
                FieldValue::Bool(v) => {
                    let _ = write!(out, "{}", v);
                }
                FieldValue::Str(v) => {
                    let _ = write!(out, "\"{}\"", escape_string_field(v));
                }
            }
        }
        if let Some(timestamp) = self.timestamp {
            let _ = write!(out, " {}", timestamp);
        }
        out
    }
}

/// A batch of points bound for one database. Not thread-safe; build one
/// per writer.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    /// Target database.
    pub database: String,
    /// Optional retention policy.
    pub retention_policy: Option<String>,
    /// Timestamp precision of the batch, defaults to `ns`.
    pub precision: String,
    /// Required write consistency, forwarded verbatim.
    pub consistency: Option<String>,
    points: Vec<Point>,
}

impl WriteBatch {
    /// An empty batch for `database`.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retention_policy: None,
            precision: "ns".to_string(),
            consistency: None,
            points: vec![],
        }
    }

    /// Append one point.
    pub fn add_point(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Append many points.
    pub fn add_points(&mut self, points: impl IntoIterator<Item = Point>) {
        self.points.extend(points);
    }

    /// Points in the batch.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The newline-terminated line-protocol body.
    pub fn line_protocol(&self) -> String {
        let mut out = String::new();
        for point in &self.points {
            out.push_str(&point.line());
            out.push('\n');
        }
        out
    }
}

/// Gzip a write body.
pub(crate) fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).context(GzipSnafu)?;
    encoder.finish().context(GzipSnafu)
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn escape_string_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
