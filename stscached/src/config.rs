//! Command-line configuration.

use clap::Parser;

/// Semantic caching middleware between analytical clients and a
/// time-series database.
#[derive(Debug, Parser)]
#[clap(name = "stscached", version)]
pub struct Config {
    /// Database HTTP endpoints (repeat or comma-separate for several).
    #[clap(
        long = "db-addr",
        env = "STSCACHED_DB_ADDR",
        default_value = "http://127.0.0.1:8086",
        use_value_delimiter = true
    )]
    pub db_addrs: Vec<String>,

    /// Logical database queries run against.
    #[clap(long = "db-name", env = "STSCACHED_DB_NAME", default_value = "benchmark")]
    pub db_name: String,

    /// Optional Basic auth username for the database.
    #[clap(long, env = "STSCACHED_USERNAME")]
    pub username: Option<String>,

    /// Optional Basic auth password for the database.
    #[clap(long, env = "STSCACHED_PASSWORD")]
    pub password: Option<String>,

    /// Skip TLS certificate verification towards the database.
    #[clap(long)]
    pub insecure_skip_verify: bool,

    /// Cache endpoints, one client each (comma-separated; `;` separates
    /// the shards inside one endpoint).
    #[clap(
        long = "cache-endpoint",
        env = "STSCACHED_CACHE_ENDPOINTS",
        default_value = "127.0.0.1:11211",
        use_value_delimiter = true
    )]
    pub cache_endpoints: Vec<String>,

    /// Per-operation cache timeout.
    #[clap(long, env = "STSCACHED_CACHE_TIMEOUT", default_value = "500ms")]
    pub cache_timeout: humantime::Duration,

    /// Per-request database timeout.
    #[clap(long, env = "STSCACHED_DB_TIMEOUT", default_value = "30s")]
    pub db_timeout: humantime::Duration,

    /// Number of logical workers queries rotate across.
    #[clap(long, env = "STSCACHED_WORKERS", default_value = "4")]
    pub workers: usize,

    /// Log filter, e.g. `info` or `stscached=debug,cache_coordinator=debug`.
    #[clap(long, env = "LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::try_parse_from(["stscached"]).unwrap();
        assert_eq!(config.db_addrs, vec!["http://127.0.0.1:8086"]);
        assert_eq!(config.db_name, "benchmark");
        assert_eq!(config.cache_endpoints, vec!["127.0.0.1:11211"]);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn lists_split_on_commas() {
        let config = Config::try_parse_from([
            "stscached",
            "--db-addr",
            "http://db0:8086,http://db1:8086",
            "--cache-endpoint",
            "c0:11211;c1:11211,c2:11211",
        ])
        .unwrap();
        assert_eq!(config.db_addrs.len(), 2);
        assert_eq!(config.cache_endpoints, vec!["c0:11211;c1:11211", "c2:11211"]);
    }
}
