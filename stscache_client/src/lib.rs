//! Client for the range-aware memcached dialect the external cache speaks.
//!
//! The cache is a key-value store whose values carry a time dimension:
//! `get` names a half-open window and the server answers with whatever
//! bytes it holds for that key inside the window, together with the
//! matched sub-ranges; `set` attaches the window the bytes cover and the
//! number of subtables inside them. Keys are full semantic segments.
//!
//! ```text
//! get <key> <t_start> <t_end>\r\n
//! VALUE <key> <flags> <bytes> [<m_start> <m_end>]...\r\n
//! <data block>\r\n
//! END\r\n
//!
//! set <key> <flags> <exptime> <bytes> <t_start> <t_end> <n_tables>\r\n
//! <data block>\r\n
//! STORED\r\n
//! ```
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod client;
mod selector;

pub use client::{Client, GetResult, Item};
pub use selector::ServerList;

use snafu::Snafu;
use std::time::Duration;

/// Longest key the cache accepts.
pub const MAX_KEY_LEN: usize = 450;

/// Cache client errors.
#[derive(Debug, Snafu)]
#[allow(missing_copy_implementations, missing_docs)]
pub enum Error {
    #[snafu(display("no cache servers configured"))]
    NoServers,

    #[snafu(display("malformed cache key {:?}", key))]
    MalformedKey { key: String },

    #[snafu(display("cache miss"))]
    CacheMiss,

    #[snafu(display("error connecting to cache server {}: {}", server, source))]
    Connect {
        server: String,
        source: std::io::Error,
    },

    #[snafu(display("i/o error talking to cache server {}: {}", server, source))]
    Io {
        server: String,
        source: std::io::Error,
    },

    #[snafu(display("cache operation timed out after {:?}", timeout))]
    Timeout { timeout: Duration },

    #[snafu(display("unexpected cache server reply {:?}", line))]
    ServerProtocol { line: String },

    #[snafu(display("cache refused the item: {:?}", line))]
    NotStored { line: String },
}

/// Result with this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A key is sendable when it fits the length bound and contains no
/// whitespace or control bytes the text protocol would choke on.
pub(crate) fn legal_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b > 0x20 && b != 0x7f)
}
