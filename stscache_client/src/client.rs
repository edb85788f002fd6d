//! The cache client proper: pooled connections and the get/set protocol.

use crate::{legal_key, selector::ServerList, Error, Result};
use data_types::TimeRange;
use parking_lot::Mutex;
use snafu::{ensure, ResultExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::debug;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Idle connections retained per server.
const MAX_IDLE_CONNS: usize = 2;

/// An item to store.
#[derive(Debug, Clone, Default)]
pub struct Item {
    /// Full semantic segment.
    pub key: String,
    /// Encoded subtable bytes.
    pub value: Vec<u8>,
    /// Opaque server-side flags.
    pub flags: u32,
    /// Expiration in seconds; zero never expires.
    pub expiration: i64,
    /// Start of the half-open window the value covers.
    pub time_start: i64,
    /// End of the half-open window the value covers.
    pub time_end: i64,
    /// Number of subtables inside the value.
    pub num_tables: i64,
    /// Compare-and-swap id; carried for protocol parity, unused by `set`.
    pub cas_id: u64,
}

/// A successful `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    /// The value bytes (possibly covering only part of the asked window).
    pub value: Vec<u8>,
    /// Flags stored with the item.
    pub flags: u32,
    /// Per-subtable sub-ranges of the asked window the value covers.
    pub matched: Vec<TimeRange>,
}

/// A cache client over one or more servers.
///
/// Safe for concurrent use; connections are checked out of a per-server
/// free list for the duration of one operation and dropped on any protocol
/// or transport error.
#[derive(Debug)]
pub struct Client {
    selector: ServerList,
    timeout: Duration,
    free_conns: Mutex<HashMap<String, Vec<BufStream<TcpStream>>>>,
}

impl Client {
    /// Client over `servers` with the [`DEFAULT_TIMEOUT`].
    pub fn new(servers: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        Self::with_timeout(servers, DEFAULT_TIMEOUT)
    }

    /// Client over `servers` with a custom per-operation timeout.
    pub fn with_timeout(
        servers: impl IntoIterator<Item = impl Into<String>>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            selector: ServerList::new(servers)?,
            timeout,
            free_conns: Mutex::new(HashMap::new()),
        })
    }

    /// The shard selector.
    pub fn selector(&self) -> &ServerList {
        &self.selector
    }

    /// Fetch whatever the cache holds for `key` inside `[t_start, t_end)`.
    ///
    /// Returns [`Error::CacheMiss`] when the key holds nothing in the
    /// window.
    pub async fn get(&self, key: &str, t_start: i64, t_end: i64) -> Result<GetResult> {
        ensure!(
            legal_key(key),
            crate::MalformedKeySnafu { key }
        );
        let server = self.selector.pick_server(key)?;
        self.bounded(self.get_on_server(&server, key, t_start, t_end))
            .await
    }

    /// Store `item` against the window it covers.
    pub async fn set(&self, item: &Item) -> Result<()> {
        ensure!(
            legal_key(&item.key),
            crate::MalformedKeySnafu {
                key: item.key.as_str()
            }
        );
        let server = self.selector.pick_server(&item.key)?;
        self.bounded(self.set_on_server(&server, item)).await
    }

    /// Ask every configured server for its version, verifying liveness.
    pub async fn ping(&self) -> Result<()> {
        for server in self.selector.servers() {
            self.bounded(self.ping_server(&server)).await?;
        }
        Ok(())
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                timeout: self.timeout,
            }),
        }
    }

    async fn get_on_server(
        &self,
        server: &str,
        key: &str,
        t_start: i64,
        t_end: i64,
    ) -> Result<GetResult> {
        let mut conn = self.checkout(server).await?;
        let result = get_on(&mut conn, server, key, t_start, t_end).await;
        // a miss leaves the connection in a clean state; anything else
        // unexpected may not, so the connection is dropped
        if matches!(result, Ok(_) | Err(Error::CacheMiss)) {
            self.checkin(server, conn);
        }
        result
    }

    async fn set_on_server(&self, server: &str, item: &Item) -> Result<()> {
        let mut conn = self.checkout(server).await?;
        let result = set_on(&mut conn, server, item).await;
        if result.is_ok() {
            self.checkin(server, conn);
        }
        result
    }

    async fn ping_server(&self, server: &str) -> Result<()> {
        let mut conn = self.checkout(server).await?;
        write_all(&mut conn, server, b"version\r\n").await?;
        let line = read_line(&mut conn, server).await?;
        ensure!(
            line.starts_with("VERSION"),
            crate::ServerProtocolSnafu { line }
        );
        self.checkin(server, conn);
        Ok(())
    }

    async fn checkout(&self, server: &str) -> Result<BufStream<TcpStream>> {
        if let Some(conn) = self
            .free_conns
            .lock()
            .get_mut(server)
            .and_then(Vec::pop)
        {
            return Ok(conn);
        }
        let stream = TcpStream::connect(server)
            .await
            .context(crate::ConnectSnafu { server })?;
        stream.set_nodelay(true).ok();
        debug!(server, "dialed cache server");
        Ok(BufStream::new(stream))
    }

    fn checkin(&self, server: &str, conn: BufStream<TcpStream>) {
        let mut pool = self.free_conns.lock();
        let list = pool.entry(server.to_string()).or_default();
        if list.len() < MAX_IDLE_CONNS {
            list.push(conn);
        }
    }
}

async fn get_on(
    conn: &mut BufStream<TcpStream>,
    server: &str,
    key: &str,
    t_start: i64,
    t_end: i64,
) -> Result<GetResult> {
    let request = format!("get {} {} {}\r\n", key, t_start, t_end);
    write_all(conn, server, request.as_bytes()).await?;

    let line = read_line(conn, server).await?;
    if line == "END" {
        return Err(Error::CacheMiss);
    }

    let mut parts = line.split_whitespace();
    let protocol_err = || Error::ServerProtocol { line: line.clone() };
    if parts.next() != Some("VALUE") {
        return Err(protocol_err());
    }
    let _key = parts.next().ok_or_else(protocol_err)?;
    let flags: u32 = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(protocol_err)?;
    let length: usize = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(protocol_err)?;

    let mut matched = vec![];
    let rest: Vec<&str> = parts.collect();
    if rest.len() % 2 != 0 {
        return Err(protocol_err());
    }
    for pair in rest.chunks(2) {
        let start: i64 = pair[0].parse().map_err(|_| protocol_err())?;
        let end: i64 = pair[1].parse().map_err(|_| protocol_err())?;
        matched.push(TimeRange::new(start, end));
    }

    let mut value = vec![0u8; length];
    conn.read_exact(&mut value)
        .await
        .context(crate::IoSnafu { server })?;
    expect_line(conn, server, "").await?;
    expect_line(conn, server, "END").await?;

    debug!(key, bytes = value.len(), ranges = matched.len(), "cache get");
    Ok(GetResult {
        value,
        flags,
        matched,
    })
}

async fn set_on(conn: &mut BufStream<TcpStream>, server: &str, item: &Item) -> Result<()> {
    let header = format!(
        "set {} {} {} {} {} {} {}\r\n",
        item.key,
        item.flags,
        item.expiration,
        item.value.len(),
        item.time_start,
        item.time_end,
        item.num_tables
    );
    conn.write_all(header.as_bytes())
        .await
        .context(crate::IoSnafu { server })?;
    conn.write_all(&item.value)
        .await
        .context(crate::IoSnafu { server })?;
    write_all(conn, server, b"\r\n").await?;

    let line = read_line(conn, server).await?;
    match line.as_str() {
        "STORED" => {
            debug!(key = item.key.as_str(), bytes = item.value.len(), "cache set");
            Ok(())
        }
        "NOT_STORED" | "EXISTS" | "NOT_FOUND" => Err(Error::NotStored { line }),
        _ => Err(Error::ServerProtocol { line }),
    }
}

async fn write_all(conn: &mut BufStream<TcpStream>, server: &str, bytes: &[u8]) -> Result<()> {
    conn.write_all(bytes)
        .await
        .context(crate::IoSnafu { server })?;
    conn.flush().await.context(crate::IoSnafu { server })
}

async fn read_line(conn: &mut BufStream<TcpStream>, server: &str) -> Result<String> {
    let mut raw = Vec::new();
    conn.read_until(b'\n', &mut raw)
        .await
        .context(crate::IoSnafu { server })?;
    while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|_| Error::ServerProtocol {
        line: "<non-utf8 line>".to_string(),
    })
}

async fn expect_line(conn: &mut BufStream<TcpStream>, server: &str, expected: &str) -> Result<()> {
    let line = read_line(conn, server).await?;
    ensure!(line == expected, crate::ServerProtocolSnafu { line });
    Ok(())
}
