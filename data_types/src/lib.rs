//! Shared value and result types used across the semantic cache workspace.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod cell;
mod response;
mod time_range;
mod timestamp;

pub use cell::{Cell, DataType, Numeric};
pub use response::{Message, QueryResult, Response, Series};
pub use time_range::TimeRange;
pub use timestamp::{format_rfc3339, parse_rfc3339, InvalidTimestamp};
