//! Shard selection within one cache client's server set.

use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Scratch buffers are capped at the hashed key prefix length.
const HASH_PREFIX_LEN: usize = 256;

/// How many scratch buffers the pool retains.
const POOL_CAP: usize = 16;

/// An atomically replaceable, concurrently readable list of cache server
/// addresses with CRC-32 key routing.
///
/// Keys route by the IEEE CRC-32 of their first 256 bytes, modulo the
/// server count; a single-server list short-circuits the hash. The scratch
/// buffer the hash reads from comes out of a small free list so the hot
/// path does not allocate.
#[derive(Debug)]
pub struct ServerList {
    servers: RwLock<Arc<Vec<String>>>,
    scratch: Mutex<Vec<Box<[u8; HASH_PREFIX_LEN]>>>,
}

impl ServerList {
    /// Build a list from the given addresses (`host:port`).
    pub fn new(servers: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let list = Self {
            servers: RwLock::new(Arc::new(vec![])),
            scratch: Mutex::new(vec![]),
        };
        list.set_servers(servers)?;
        Ok(list)
    }

    /// Atomically replace the server set. Fails on an empty or whitespace
    /// address; the previous set stays in place on failure.
    pub fn set_servers(
        &self,
        servers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<()> {
        let servers: Vec<String> = servers.into_iter().map(Into::into).collect();
        if servers.is_empty() {
            return Err(Error::NoServers);
        }
        for server in &servers {
            if server.is_empty() || server.contains(char::is_whitespace) {
                return Err(Error::MalformedKey {
                    key: server.clone(),
                });
            }
        }
        *self.servers.write() = Arc::new(servers);
        Ok(())
    }

    /// The server a key routes to.
    pub fn pick_server(&self, key: &str) -> Result<String> {
        let servers = Arc::clone(&self.servers.read());
        match servers.len() {
            0 => Err(Error::NoServers),
            1 => Ok(servers[0].clone()),
            n => {
                let mut buf = self
                    .scratch
                    .lock()
                    .pop()
                    .unwrap_or_else(|| Box::new([0u8; HASH_PREFIX_LEN]));
                let take = key.len().min(HASH_PREFIX_LEN);
                buf[..take].copy_from_slice(&key.as_bytes()[..take]);
                let sum = crc32fast::hash(&buf[..take]);

                let mut pool = self.scratch.lock();
                if pool.len() < POOL_CAP {
                    pool.push(buf);
                }
                Ok(servers[sum as usize % n].clone())
            }
        }
    }

    /// Run `f` over every configured server, stopping at the first error.
    pub fn each<E>(&self, mut f: impl FnMut(&str) -> Result<(), E>) -> Result<(), E> {
        let servers = Arc::clone(&self.servers.read());
        for server in servers.iter() {
            f(server)?;
        }
        Ok(())
    }

    /// Snapshot of the configured servers.
    pub fn servers(&self) -> Vec<String> {
        self.servers.read().as_ref().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            ServerList::new(Vec::<String>::new()).unwrap_err(),
            Error::NoServers
        ));
    }

    #[test]
    fn single_server_short_circuits() {
        let list = ServerList::new(["127.0.0.1:11211"]).unwrap();
        for key in ["a", "b", "anything at all"] {
            assert_eq!(list.pick_server(key).unwrap(), "127.0.0.1:11211");
        }
    }

    #[test]
    fn pick_is_deterministic_and_in_range() {
        let servers = ["c0:11211", "c1:11211", "c2:11211"];
        let list = ServerList::new(servers).unwrap();
        for key in ["alpha", "beta", "gamma", "delta"] {
            let first = list.pick_server(key).unwrap();
            let second = list.pick_server(key).unwrap();
            assert_eq!(first, second);
            assert!(servers.contains(&first.as_str()));
        }
    }

    #[test]
    fn pick_follows_ieee_crc32() {
        let servers = ["c0:11211", "c1:11211"];
        let list = ServerList::new(servers).unwrap();
        // CRC-32(IEEE) of "abc" is 0x352441c2, an even number
        assert_eq!(0x352441c2u32 % 2, 0);
        assert_eq!(list.pick_server("abc").unwrap(), "c0:11211");
    }

    #[test]
    fn long_keys_hash_only_the_prefix() {
        let servers = ["c0:11211", "c1:11211", "c2:11211"];
        let list = ServerList::new(servers).unwrap();
        let prefix = "p".repeat(HASH_PREFIX_LEN);
        let a = list.pick_server(&(prefix.clone() + "suffix-one")).unwrap();
        let b = list.pick_server(&(prefix + "suffix-two")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn set_servers_swaps_atomically() {
        let list = ServerList::new(["c0:11211"]).unwrap();
        list.set_servers(["c1:11211"]).unwrap();
        assert_eq!(list.pick_server("k").unwrap(), "c1:11211");

        // a bad replacement leaves the old set intact
        assert!(list.set_servers(Vec::<String>::new()).is_err());
        assert_eq!(list.servers(), vec!["c1:11211"]);
    }

    #[test]
    fn each_visits_every_server() {
        let list = ServerList::new(["c0:11211", "c1:11211"]).unwrap();
        let mut seen = vec![];
        list.each::<()>(|server| {
            seen.push(server.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["c0:11211", "c1:11211"]);
    }
}
