//! Conversion between tabular results and the compact self-describing byte
//! layout the cache stores.
//!
//! Two layouts exist. The row-major layout interleaves columns row by row,
//! one block per subtable, each block preceded by the subtable's semantic
//! segment and the block's byte length:
//!
//! ```text
//! {(cpu.hostname=host_0)}#{usage_guest[float64]}#{empty}#{empty,empty} <len:i64 LE>
//! <row 0: time usage_guest><row 1: ...>...
//! ```
//!
//! The columnar layout stores each column contiguously behind a header
//! naming the subtable conjunction, the column and its type. Decoding
//! dispatches on the first byte of the stream: `{` for row-major, `(` for
//! columnar.
//!
//! All numerics are little-endian; strings occupy fixed 25-byte
//! zero-padded slots and silently truncate when longer. Null cells encode
//! as zero values of the column type, so null and zero cannot be told
//! apart after a round trip. A trailing CRLF (appended by text-protocol
//! caches) is tolerated and stripped.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod columnar;
mod row;
mod values;

pub use columnar::encode_response_columnar;
pub use row::encode_response;
pub use values::{column_width, decode_cell, encode_cell, STRING_SLOT_LEN};

use data_types::{DataType, Response};
use snafu::Snafu;

/// The sentinel an empty response encodes to.
pub const EMPTY_SENTINEL: &[u8] = b"empty response";

/// Codec errors. Encoding errors mean the response disagrees with the
/// declared schema; decoding errors mean the byte stream is corrupt and the
/// request must fall back to the database.
#[derive(Debug, Snafu)]
#[allow(missing_copy_implementations, missing_docs)]
pub enum Error {
    #[snafu(display(
        "row has {} cells but the declared schema has {} columns",
        actual,
        expected
    ))]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[snafu(display("cell {} does not fit declared column type {}", value, datatype))]
    CellTypeMismatch { value: String, datatype: DataType },

    #[snafu(display(
        "subtable byte length {} is not a multiple of its row width {}",
        length,
        width
    ))]
    UnevenRows { length: i64, width: usize },

    #[snafu(display("byte stream is corrupt: {}", reason))]
    Corrupt { reason: String },

    #[snafu(display("embedded segment does not parse: {}", source))]
    Segment { source: semantic_segment::Error },
}

/// Result with this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// What came back out of a cached byte stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The reconstructed response, subtables in stream order.
    pub response: Response,
    /// Per subtable: did it decode at least one row?
    pub hit_flags: Vec<bool>,
    /// Per subtable: inclusive first/last row timestamps, when rows exist.
    pub time_ranges: Vec<Option<(i64, i64)>>,
    /// Per subtable: the `key=value` pairs of its conjunction.
    pub tags: Vec<Vec<(String, String)>>,
    /// Per subtable: the embedded segment (row-major) or column-header
    /// conjunction (columnar) it was declared under.
    pub segments: Vec<String>,
}

impl Decoded {
    fn empty() -> Self {
        Self {
            response: Response::default(),
            hit_flags: vec![],
            time_ranges: vec![],
            tags: vec![],
            segments: vec![],
        }
    }
}

/// Decode a byte stream produced by [`encode_response`],
/// [`encode_response_columnar`], or the cache echoing either back.
pub fn decode_response(bytes: &[u8]) -> Result<Decoded> {
    let bytes = strip_crlf(bytes);
    if bytes.is_empty() || bytes == EMPTY_SENTINEL {
        return Ok(Decoded::empty());
    }

    match bytes.first() {
        Some(b'{') => row::decode(bytes),
        Some(b'(') => columnar::decode(bytes),
        Some(other) => CorruptSnafu {
            reason: format!("unrecognized layout marker 0x{:02x}", other),
        }
        .fail(),
        None => Ok(Decoded::empty()),
    }
}

fn strip_crlf(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\r\n").unwrap_or(bytes)
}
