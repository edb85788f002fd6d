//! Parsing per-subtable segments back into their parts.
//!
//! The byte codec stores one separate segment ahead of each subtable's rows
//! and must reconstruct column names, datatypes and tags from that string
//! alone on the way back out.

use crate::parse::TagOp;
use crate::{Error, Result};
use data_types::DataType;

/// The decomposed form of one subtable's segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SeparateSegment {
    /// Measurement name.
    pub measurement: String,
    /// `key=value` pairs of the conjunction; negated terms are not listed.
    pub tags: Vec<(String, String)>,
    /// Selected fields with datatypes, `time` excluded.
    pub fields: Vec<(String, DataType)>,
    /// Aggregation name, when present.
    pub aggregation: Option<String>,
    /// Bucket interval text (`1m`), when present.
    pub interval: Option<String>,
}

impl SeparateSegment {
    /// Parse `{(m.k=v,...)}#{f[t],...}#{...}#{aggr,interval}`.
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedSegment {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = text.split('#').collect();
        if parts.len() != 4 {
            return Err(malformed("expected four #-separated groups"));
        }

        let conjunction = unbrace(parts[0]).ok_or_else(|| malformed("unbraced conjunction"))?;
        let conjunction = conjunction
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| malformed("conjunction not parenthesized"))?;

        let mut measurement = String::new();
        let mut tags = vec![];
        for term in conjunction.split(',') {
            let dot = term.find('.').ok_or_else(|| malformed("term without measurement"))?;
            if measurement.is_empty() {
                measurement = term[..dot].to_string();
            }
            let term = &term[dot + 1..];
            if term == "empty" {
                continue;
            }
            match split_tag_term(term) {
                Some((key, TagOp::Eq, value)) => tags.push((key, value)),
                Some((_, TagOp::NotEq, _)) => continue,
                None => return Err(malformed("term without operator")),
            }
        }

        let fields_text = unbrace(parts[1]).ok_or_else(|| malformed("unbraced field list"))?;
        let mut fields = vec![];
        for field in fields_text.split(',').filter(|f| !f.is_empty()) {
            let open = field.find('[').ok_or_else(|| malformed("field without datatype"))?;
            let close = field.find(']').ok_or_else(|| malformed("field without datatype"))?;
            let datatype = DataType::parse(&field[open + 1..close])
                .ok_or_else(|| malformed("unknown datatype"))?;
            fields.push((field[..open].to_string(), datatype));
        }

        let tail = unbrace(parts[3]).ok_or_else(|| malformed("unbraced aggregation group"))?;
        let (aggregation, interval) = match tail.split_once(',') {
            Some((aggregation, interval)) => (
                not_empty(aggregation).map(str::to_string),
                not_empty(interval).map(str::to_string),
            ),
            None => return Err(malformed("aggregation group without interval slot")),
        };

        Ok(Self {
            measurement,
            tags,
            fields,
            aggregation,
            interval,
        })
    }

    /// Column names and datatypes of the subtable's rows: `time` first, and
    /// with an aggregation the single value column takes the aggregation's
    /// name.
    pub fn columns(&self) -> (Vec<String>, Vec<DataType>) {
        let mut datatypes = vec![DataType::Int64];
        datatypes.extend(self.fields.iter().map(|(_, datatype)| *datatype));

        let mut columns = vec!["time".to_string()];
        match &self.aggregation {
            Some(aggregation) => columns.push(aggregation.clone()),
            None => columns.extend(self.fields.iter().map(|(name, _)| name.clone())),
        }
        (columns, datatypes)
    }
}

/// Split `key=value` / `key!=value`.
pub(crate) fn split_tag_term(term: &str) -> Option<(String, TagOp, String)> {
    if let Some(at) = term.find("!=") {
        Some((
            term[..at].to_string(),
            TagOp::NotEq,
            term[at + 2..].to_string(),
        ))
    } else {
        term.find('=').map(|at| {
            (
                term[..at].to_string(),
                TagOp::Eq,
                term[at + 1..].to_string(),
            )
        })
    }
}

fn unbrace(text: &str) -> Option<&str> {
    text.strip_prefix('{').and_then(|s| s.strip_suffix('}'))
}

fn not_empty(text: &str) -> Option<&str> {
    (text != "empty" && !text.is_empty()).then(|| text)
}
