//! HTTP client for the 1.x time-series database API: `/query`, `/write`
//! and `/ping`.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod write;

pub use write::{FieldValue, Point, WriteBatch};

use async_trait::async_trait;
use data_types::Response;
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use schema_catalog::MetadataSource;
use snafu::{ensure, ResultExt, Snafu};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = "InfluxDBClient";

const VERSION_HEADER: &str = "X-Influxdb-Version";

/// Client errors.
#[derive(Debug, Snafu)]
#[allow(missing_copy_implementations, missing_docs)]
pub enum Error {
    #[snafu(display(
        "unsupported protocol scheme in {:?}: address must start with http:// or https://",
        addr
    ))]
    UnsupportedScheme { addr: String },

    #[snafu(display("invalid server address {:?}: {}", addr, source))]
    InvalidAddr {
        addr: String,
        source: url::ParseError,
    },

    #[snafu(display("error building the http client: {}", source))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("request failed: {}", source))]
    Request { source: reqwest::Error },

    #[snafu(display("received status code {} from downstream server: {}", status, body))]
    Downstream { status: u16, body: String },

    #[snafu(display(
        "expected a json response, got {:?} with status {}",
        content_type,
        status
    ))]
    NotJson {
        content_type: String,
        status: u16,
    },

    #[snafu(display("unable to decode json response (status {}): {}", status, source))]
    DecodeJson {
        status: u16,
        source: serde_json::Error,
    },

    #[snafu(display("received status code {} from server", status))]
    Status { status: u16 },

    #[snafu(display("ping failed: {}", body))]
    PingFailed { body: String },

    #[snafu(display("error gzip-compressing the write body: {}", source))]
    Gzip { source: std::io::Error },
}

/// Result with this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Body compression applied to write requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    /// Plain line protocol.
    #[default]
    Default,
    /// Gzip-compressed line protocol.
    Gzip,
}

/// Everything needed to construct a [`Client`].
#[derive(Debug, Clone, Default)]
pub struct HttpConfig {
    /// Server address, `http://host:port` or `https://host:port`.
    pub addr: String,
    /// Optional Basic auth username.
    pub username: Option<String>,
    /// Optional Basic auth password.
    pub password: Option<String>,
    /// `User-Agent` header, defaults to [`DEFAULT_USER_AGENT`].
    pub user_agent: Option<String>,
    /// Per-request timeout; no timeout when absent.
    pub timeout: Option<Duration>,
    /// Skip TLS certificate verification.
    pub insecure_skip_verify: bool,
    /// Compression of write bodies.
    pub write_encoding: ContentEncoding,
}

/// One query to send.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Query text.
    pub command: String,
    /// Target database.
    pub database: String,
    /// Optional retention policy.
    pub retention_policy: Option<String>,
    /// Timestamp precision (`epoch` parameter); RFC3339 strings come back
    /// when absent.
    pub precision: Option<String>,
    /// Ask the server to stream the result in chunks.
    pub chunked: bool,
    /// Rows per chunk when `chunked` is set.
    pub chunk_size: Option<usize>,
}

impl Query {
    /// A query in epoch-second precision, the form the cache pipeline
    /// always uses.
    pub fn new(command: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            database: database.into(),
            precision: Some("s".to_string()),
            ..Default::default()
        }
    }

    /// Override the precision (`ns`, `s`, ... or `None` for RFC3339).
    pub fn with_precision(mut self, precision: Option<&str>) -> Self {
        self.precision = precision.map(str::to_string);
        self
    }
}

/// A client for one database server. Cheap to clone is not needed here:
/// the connection pool holds one per endpoint, built once at startup.
#[derive(Debug)]
pub struct Client {
    url: Url,
    username: Option<String>,
    password: Option<String>,
    user_agent: String,
    write_encoding: ContentEncoding,
    http: reqwest::Client,
}

impl Client {
    /// Build a client from `config`.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let url = Url::parse(&config.addr).context(InvalidAddrSnafu {
            addr: config.addr.clone(),
        })?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            UnsupportedSchemeSnafu {
                addr: config.addr.clone(),
            }
        );

        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(config.insecure_skip_verify);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context(BuildClientSnafu)?;

        Ok(Self {
            url,
            username: config.username,
            password: config.password,
            user_agent: config
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            write_encoding: config.write_encoding,
            http,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.url.clone();
        // Url::join would drop any base path the address carries
        url.path_segments_mut()
            .map(|mut segments| {
                segments.pop_if_empty().push(path);
            })
            .ok();
        url
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(USER_AGENT, self.user_agent.as_str());
        match &self.username {
            Some(username) if !username.is_empty() => {
                request.basic_auth(username, self.password.as_deref())
            }
            _ => request,
        }
    }

    /// Check the server is up. Returns the round-trip time and the server
    /// version; success is 204 with the version header.
    pub async fn ping(&self, wait_for_leader: Option<Duration>) -> Result<(Duration, String)> {
        let started = std::time::Instant::now();
        let mut request = self.apply_auth(self.http.get(self.endpoint("ping")));
        if let Some(timeout) = wait_for_leader {
            request = request.query(&[("wait_for_leader", format!("{}s", timeout.as_secs()))]);
        }

        let response = request.send().await.context(RequestSnafu)?;
        let status = response.status();
        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.unwrap_or_default();
        ensure!(status == StatusCode::NO_CONTENT, PingFailedSnafu { body });
        Ok((started.elapsed(), version))
    }

    /// Run `query` and decode the tabular response. Timestamps are
    /// normalized to epoch-second integers on the way in; database-level
    /// errors stay embedded in the returned [`Response`].
    pub async fn query(&self, query: &Query) -> Result<Response> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.command.clone()),
            ("db", query.database.clone()),
        ];
        if let Some(rp) = &query.retention_policy {
            params.push(("rp", rp.clone()));
        }
        if let Some(precision) = &query.precision {
            params.push(("epoch", precision.clone()));
        }
        if query.chunked {
            params.push(("chunked", "true".to_string()));
            if let Some(size) = query.chunk_size {
                params.push(("chunk_size", size.to_string()));
            }
        }

        let request = self
            .apply_auth(self.http.post(self.endpoint("query")))
            .query(&params);
        let http_response = request.send().await.context(RequestSnafu)?;
        let status = http_response.status();
        check_response(&status, http_response.headers())?;

        let body = http_response.text().await.context(RequestSnafu)?;
        let mut response = if query.chunked {
            fold_chunked(&body, status.as_u16())?
        } else {
            serde_json::from_str(&body).context(DecodeJsonSnafu {
                status: status.as_u16(),
            })?
        };

        if status != StatusCode::OK && response.error().is_none() {
            return StatusSnafu {
                status: status.as_u16(),
            }
            .fail();
        }

        response.normalize_time_column();
        debug!(
            db = query.database.as_str(),
            subtables = response.num_tables(),
            "query returned"
        );
        Ok(response)
    }

    /// Write a batch of points in line protocol.
    pub async fn write(&self, batch: &WriteBatch) -> Result<()> {
        let body = batch.line_protocol();

        let mut params: Vec<(&str, String)> = vec![
            ("db", batch.database.clone()),
            ("precision", batch.precision.clone()),
        ];
        if let Some(rp) = &batch.retention_policy {
            params.push(("rp", rp.clone()));
        }
        if let Some(consistency) = &batch.consistency {
            params.push(("consistency", consistency.clone()));
        }

        let mut request = self
            .apply_auth(self.http.post(self.endpoint("write")))
            .query(&params);
        request = match self.write_encoding {
            ContentEncoding::Gzip => request
                .header("Content-Encoding", "gzip")
                .body(write::gzip(body.as_bytes())?),
            ContentEncoding::Default => request.body(body),
        };

        let response = request.send().await.context(RequestSnafu)?;
        let status = response.status();
        if status != StatusCode::NO_CONTENT && status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return DownstreamSnafu {
                status: status.as_u16(),
                body,
            }
            .fail();
        }
        Ok(())
    }
}

/// Replies lacking the version header with a 5xx status, or carrying a
/// non-JSON content type, came from some intermediary rather than the
/// database; surface that distinctly.
fn check_response(status: &StatusCode, headers: &HeaderMap) -> Result<()> {
    let version = headers.get(VERSION_HEADER);
    if version.is_none() && status.is_server_error() {
        return DownstreamSnafu {
            status: status.as_u16(),
            body: "no response body".to_string(),
        }
        .fail();
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    ensure!(
        media_type == "application/json",
        NotJsonSnafu {
            content_type,
            status: status.as_u16(),
        }
    );
    Ok(())
}

/// Fold a chunked (newline-delimited JSON) body into one response.
fn fold_chunked(body: &str, status: u16) -> Result<Response> {
    let mut folded = Response::default();
    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        let chunk: Response =
            serde_json::from_str(line).context(DecodeJsonSnafu { status })?;
        folded.results.extend(chunk.results);
        if chunk.error.is_some() {
            folded.error = chunk.error;
            break;
        }
    }
    Ok(folded)
}

#[async_trait]
impl MetadataSource for Client {
    async fn metadata_query(
        &self,
        database: &str,
        query: &str,
    ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .query(&Query::new(query, database).with_precision(None))
            .await?;
        if let Some(message) = response.error() {
            return Err(message.to_string().into());
        }
        Ok(response)
    }
}
