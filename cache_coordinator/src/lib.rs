//! The per-query pipeline that makes a range-aware key-value store behave
//! as a semantic query cache.
//!
//! One call to [`CacheCoordinator::execute`] runs: query analysis → segment
//! memoization → cache shard probe → partial-hit resolution → residual
//! database fetch → time-ordered merge → residual write-back. The
//! [`CoreContext`] value carries every collaborator (database handles,
//! cache handles, schema catalog, template memo); nothing lives in process
//! globals, so tests build their own contexts.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod context;
mod coordinator;
mod coverage;
mod merge;
mod pool;
mod residual;

pub use context::{CacheHit, CacheItem, CoreContext, CoreContextBuilder, Database, RangeCache};
pub use coordinator::{CacheCoordinator, HitKind, QueryOutcome};
pub use coverage::SubtableCoverage;
pub use merge::merge_responses;
pub use pool::ConnectionPool;
pub use residual::residual_query;

use data_types::Response;
use snafu::Snafu;

/// Errors of transport-level collaborators, carried opaquely.
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Coordinator errors. Cache unavailability and codec corruption are *not*
/// listed: both degrade to a direct database query inside the pipeline.
#[derive(Debug, Snafu)]
#[allow(missing_copy_implementations, missing_docs)]
pub enum Error {
    #[snafu(display("query analysis failed: {}", source))]
    Analysis { source: semantic_segment::Error },

    #[snafu(display("schema catalog load failed: {}", source))]
    CatalogLoad { source: schema_catalog::Error },

    #[snafu(display("context has no metadata source to load the schema catalog from"))]
    NoMetadataSource,

    #[snafu(display("database query failed: {}", message))]
    Database {
        message: String,
        /// Whatever the cache had already produced before the database
        /// failed, so callers can degrade gracefully.
        partial: Option<Box<Response>>,
    },

    #[snafu(display("residual query construction failed: {}", source))]
    ResidualTimestamp {
        source: data_types::InvalidTimestamp,
    },
}

/// Result with this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
