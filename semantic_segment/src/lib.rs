//! Query analysis: from SQL-ish time-series query text to the canonical
//! semantic segment that keys the cache.
//!
//! A semantic segment is four `#`-separated groups:
//!
//! ```text
//! {(cpu.hostname=host_0)}#{usage_guest[float64]}#{empty}#{empty,empty}
//!  └ subtable conjunctions ┘└ fields ┘            └ preds┘└ aggregation ┘
//! ```
//!
//! Two queries that differ only in their time literals produce the same
//! segment; that is what lets the cache track time coverage per key instead
//! of storing one entry per window.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod canonical;
mod duration;
mod parse;
mod separate;
mod template;
pub mod test_fixtures;

pub use canonical::{
    integrated_segment, segment_for_tags, separate_segment_text, subtable_conjunctions,
    Conjunction, ConjunctionTerm,
};
pub use duration::{format_duration, parse_duration};
pub use parse::{
    CompareOp, FieldPredicate, ParsedQuery, PredicateLiteral, QueryAnalyzer, QueryField, TagOp,
    TagPredicate,
};
pub use separate::SeparateSegment;
pub use template::query_template;

use snafu::Snafu;

/// Errors produced while analyzing a query.
#[derive(Debug, Snafu)]
#[allow(missing_copy_implementations, missing_docs)]
pub enum Error {
    #[snafu(display("query is not parseable: {}", source))]
    Parse {
        source: sqlparser::parser::ParserError,
    },

    #[snafu(display("query is not a SELECT statement"))]
    NotASelect,

    #[snafu(display("query selects from no measurement"))]
    NoMeasurement,

    #[snafu(display(
        "measurement {:?} is not in the schema catalog; load it first",
        measurement
    ))]
    SchemaMissing { measurement: String },

    #[snafu(display("unsupported expression in WHERE clause: {}", text))]
    UnsupportedPredicate { text: String },

    #[snafu(display("invalid time literal: {}", source))]
    InvalidTime { source: data_types::InvalidTimestamp },

    #[snafu(display("invalid duration literal {:?}", text))]
    InvalidDuration { text: String },

    #[snafu(display("segment fragment {:?} does not parse: {}", text, reason))]
    MalformedSegment { text: String, reason: String },
}

/// Result with this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
