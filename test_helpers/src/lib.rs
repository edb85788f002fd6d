//! Helpers shared by unit and integration tests across the workspace.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs, clippy::explicit_iter_loop, clippy::use_self)]

use parking_lot::Once;
use tracing_subscriber::EnvFilter;

static LOG_SETUP: Once = Once::new();

/// Start tracing output for a test. Uses `RUST_LOG` when set, otherwise
/// defaults to `debug`. Safe to call from any number of tests; the
/// subscriber is installed once per process.
pub fn start_logging() {
    LOG_SETUP.call_once(|| {
        tracing_log::LogTracer::init().ok();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    });
}

/// Start logging only when `RUST_LOG` is set, so the default test run stays
/// quiet.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging();
    }
}
