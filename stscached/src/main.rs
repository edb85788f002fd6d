//! `stscached` wires the cache pipeline to a real database and cache fleet
//! and serves queries read line-by-line from stdin.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod config;

use cache_coordinator::{CacheCoordinator, CoreContext};
use clap::Parser;
use config::Config;
use influxdb_client::HttpConfig;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    let mut builder = CoreContext::builder().database_name(&config.db_name);

    let mut first_database = None;
    for addr in &config.db_addrs {
        let client = Arc::new(influxdb_client::Client::new(HttpConfig {
            addr: addr.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: Some(config.db_timeout.into()),
            insecure_skip_verify: config.insecure_skip_verify,
            ..Default::default()
        })?);
        if first_database.is_none() {
            first_database = Some(Arc::clone(&client));
        }
        builder = builder.add_database(client);
    }

    for endpoint in &config.cache_endpoints {
        // an endpoint may itself be a sharded `host:port;host:port` set
        let servers: Vec<&str> = endpoint.split(';').collect();
        let client = stscache_client::Client::with_timeout(servers, config.cache_timeout.into())?;
        builder = builder.add_cache(Arc::new(client));
    }

    if let Some(database) = first_database {
        match database.ping(None).await {
            Ok((elapsed, version)) => {
                info!(?elapsed, version = version.as_str(), "database is up")
            }
            Err(error) => warn!(%error, "database ping failed, continuing anyway"),
        }
        builder = builder.metadata_source(database);
    }

    let context = Arc::new(builder.build()?);
    if let Err(error) = context.load_catalog().await {
        warn!(%error, "schema catalog not loaded yet; will retry on demand");
    }

    let coordinator = CacheCoordinator::new(context);
    info!(
        workers = config.workers,
        db = config.db_name.as_str(),
        "accepting queries on stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut worker = 0usize;
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() || query.starts_with('#') {
            continue;
        }

        match coordinator.execute(query, worker).await {
            Ok(outcome) => {
                println!("{}", outcome.response.to_text());
                println!(
                    "-- {:?}, {} bytes served from cache",
                    outcome.hit, outcome.bytes_served
                );
            }
            Err(error) => {
                error!(query, %error, "query failed");
                println!("-- error: {}", error);
            }
        }
        worker = (worker + 1) % config.workers.max(1);
    }

    Ok(())
}
