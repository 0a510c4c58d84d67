//! Memcached backend speaking the text protocol over TCP.
//!
//! One short-lived connection per operation. Keys are spread over the
//! configured servers by a stable hash, so every process sharing the same
//! server list agrees on where a key lives.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sfdaas_core::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::backend::CacheBackend;

/// Longest key memcached accepts.
const MAX_KEY_BYTES: usize = 250;

/// Longest relative expiry memcached accepts (30 days); larger exptimes are
/// read as absolute Unix timestamps.
pub const MAX_TTL_SECONDS: u32 = 30 * 24 * 60 * 60;

/// Largest value we are willing to read back (1 MiB, the memcached default item size).
const MAX_VALUE_BYTES: usize = 1024 * 1024;

pub struct MemcachedBackend {
    servers: Vec<String>,
}

impl MemcachedBackend {
    /// Build from a whitespace- or comma-separated list of `host:port` addresses.
    pub fn from_addresses(addresses: &str) -> Result<Self> {
        let servers: Vec<String> = addresses
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if servers.is_empty() {
            return Err(Error::Config("no memcached address given".to_string()));
        }
        if let Some(bad) = servers.iter().find(|s| !s.contains(':')) {
            return Err(Error::Config(format!(
                "memcached address {:?} must be host:port",
                bad
            )));
        }
        Ok(Self { servers })
    }

    fn server_for(&self, key: &str) -> &str {
        let digest = Sha256::digest(key.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let idx = (u64::from_be_bytes(head) % self.servers.len() as u64) as usize;
        &self.servers[idx]
    }

    async fn connect(&self, key: &str) -> Result<TcpStream> {
        let server = self.server_for(key);
        TcpStream::connect(server)
            .await
            .map_err(|e| Error::Backend(format!("connect {}: {}", server, e)))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_BYTES {
        return Err(Error::Backend(format!(
            "memcached key must be 1..={} bytes, got {}",
            MAX_KEY_BYTES,
            key.len()
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::Backend(
            "memcached key contains whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}

fn io_err(op: &str) -> impl Fn(std::io::Error) -> Error + '_ {
    move |e| Error::Backend(format!("memcached {}: {}", op, e))
}

#[async_trait]
impl CacheBackend for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let stream = self.connect(key).await?;
        let mut stream = BufReader::new(stream);

        stream
            .get_mut()
            .write_all(format!("get {}\r\n", key).as_bytes())
            .await
            .map_err(io_err("get"))?;

        let mut header = String::new();
        stream.read_line(&mut header).await.map_err(io_err("get"))?;
        let header = header.trim_end();

        if header == "END" {
            debug!("memcached miss: {}", key);
            return Ok(None);
        }

        // VALUE <key> <flags> <bytes> [<cas>]
        let parts: Vec<&str> = header.split(' ').collect();
        if parts.len() < 4 || parts[0] != "VALUE" {
            return Err(Error::Backend(format!("unexpected get reply: {:?}", header)));
        }
        let len: usize = parts[3]
            .parse()
            .map_err(|_| Error::Backend(format!("bad value length in {:?}", header)))?;
        if len > MAX_VALUE_BYTES {
            return Err(Error::Backend(format!("value of {} bytes is too large", len)));
        }

        // Payload plus trailing \r\n.
        let mut data = vec![0u8; len + 2];
        stream.read_exact(&mut data).await.map_err(io_err("get"))?;
        data.truncate(len);

        let mut end = String::new();
        stream.read_line(&mut end).await.map_err(io_err("get"))?;
        if end.trim_end() != "END" {
            return Err(Error::Backend(format!("missing END after value: {:?}", end)));
        }

        Ok(Some(data))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_seconds: u32) -> Result<()> {
        validate_key(key)?;
        if ttl_seconds > MAX_TTL_SECONDS {
            return Err(Error::Backend(format!(
                "memcached TTL must be at most {} seconds, got {}",
                MAX_TTL_SECONDS, ttl_seconds
            )));
        }
        let stream = self.connect(key).await?;
        let mut stream = BufReader::new(stream);

        let mut request = format!("set {} 0 {} {}\r\n", key, ttl_seconds, value.len()).into_bytes();
        request.extend_from_slice(value);
        request.extend_from_slice(b"\r\n");
        stream
            .get_mut()
            .write_all(&request)
            .await
            .map_err(io_err("set"))?;

        let mut reply = String::new();
        stream.read_line(&mut reply).await.map_err(io_err("set"))?;
        match reply.trim_end() {
            "STORED" => Ok(()),
            other => Err(Error::Backend(format!("set rejected: {:?}", other))),
        }
    }

    fn describe(&self) -> Vec<String> {
        self.servers.clone()
    }
}
