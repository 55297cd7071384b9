//! # Synchronous client API
//!
//! Exposes a compact, blocking API for issuing RESP-compatible commands
//! against the server.
//!
//! ## Design
//! 1. **Facade**: `KVClient` hides pooling and protocol details.
//! 2. **Borrow-friendly**: accept `&[u8]` to avoid unnecessary copies.
//! 3. **Fail fast**: protocol violations surface immediately as errors.
//! 4. **Performance first**: prefer direct TCP writes and buffer reuse.

use std::fmt;
use std::time::Duration;

use crate::pool::{ConnectionPool, PoolConfig};
use crate::resp::RespValue;

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    Io(std::io::Error),
    /// RESP2 framing or parse error.
    Protocol,
    /// Server returned an error reply.
    Server { message: Vec<u8> },
    /// Response type did not match the expected command response.
    UnexpectedResponse,
    /// Pool is at capacity and no idle connections are available.
    PoolExhausted,
    /// Address could not be parsed into a socket address.
    InvalidAddress,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {}", err),
            ClientError::Protocol => write!(f, "protocol error"),
            ClientError::Server { message } => {
                write!(f, "server error: {}", String::from_utf8_lossy(message))
            }
            ClientError::UnexpectedResponse => write!(f, "unexpected response"),
            ClientError::PoolExhausted => write!(f, "connection pool exhausted"),
            ClientError::InvalidAddress => write!(f, "invalid address"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

/// TTL state returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

/// Configuration for the synchronous client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6380".
    pub addr: String,
    pub max_idle: usize,
    pub max_total: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6380".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// Synchronous client with connection pooling. Each call acquires a
/// connection, executes one command, and returns it to the pool.
pub struct KVClient {
    pool: ConnectionPool,
}

fn expect_ok(resp: RespValue) -> ClientResult<()> {
    match resp {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_integer(resp: RespValue) -> ClientResult<i64> {
    match resp {
        RespValue::Integer(value) => Ok(value),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_bulk(resp: RespValue) -> ClientResult<Option<Vec<u8>>> {
    match resp {
        RespValue::Bulk(data) => Ok(data),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_bulk_array(resp: RespValue) -> ClientResult<Vec<Option<Vec<u8>>>> {
    match resp {
        RespValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                RespValue::Bulk(data) => Ok(data),
                RespValue::Error(message) => Err(ClientError::Server { message }),
                _ => Err(ClientError::UnexpectedResponse),
            })
            .collect(),
        RespValue::Error(message) => Err(ClientError::Server { message }),
        _ => Err(ClientError::UnexpectedResponse),
    }
}

impl KVClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.addr = addr.into();
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        })?;
        Ok(KVClient { pool })
    }

    // -- connection / admin --------------------------------------------

    pub fn auth(&self, username: &str, password: &str) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"AUTH", username.as_bytes(), password.as_bytes()])?)
    }

    pub fn ping(&self, payload: Option<&[u8]>) -> ClientResult<Vec<u8>> {
        let mut conn = self.pool.acquire()?;
        let response = match payload {
            Some(data) => conn.exec(&[b"PING", data])?,
            None => conn.exec(&[b"PING"])?,
        };
        match response {
            RespValue::Simple(text) => Ok(text),
            RespValue::Bulk(Some(data)) => Ok(data),
            RespValue::Error(message) => Err(ClientError::Server { message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub fn save(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"SAVE"])?)
    }

    pub fn rewrite_aof(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"REWRITEAOF"])?)
    }

    pub fn dbsize(&self) -> ClientResult<i64> {
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&[b"DBSIZE"])?)
    }

    pub fn flushall(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"FLUSHALL"])?)
    }

    pub fn info(&self) -> ClientResult<Vec<u8>> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"INFO"])? {
            RespValue::Bulk(Some(data)) => Ok(data),
            RespValue::Error(message) => Err(ClientError::Server { message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    // -- strings ---------------------------------------------------------

    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        expect_bulk(conn.exec(&[b"GET", key])?)
    }

    pub fn mget(&self, keys: &[&[u8]]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push(&b"MGET"[..]);
        args.extend_from_slice(keys);
        let mut conn = self.pool.acquire()?;
        expect_bulk_array(conn.exec(&args)?)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"SET", key, value])?)
    }

    pub fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> ClientResult<()> {
        let (seconds, len) = encode_u64(ttl.as_secs());
        let mut conn = self.pool.acquire()?;
        expect_ok(conn.exec(&[b"SET", key, value, b"EX", &seconds[..len]])?)
    }

    pub fn delete(&self, key: &[u8]) -> ClientResult<bool> {
        let mut conn = self.pool.acquire()?;
        Ok(expect_integer(conn.exec(&[b"DEL", key])?)? > 0)
    }

    pub fn expire(&self, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        let (seconds, len) = encode_u64(ttl.as_secs());
        let mut conn = self.pool.acquire()?;
        Ok(expect_integer(conn.exec(&[b"EXPIRE", key, &seconds[..len]])?)? == 1)
    }

    pub fn ttl(&self, key: &[u8]) -> ClientResult<ClientTtl> {
        let mut conn = self.pool.acquire()?;
        match expect_integer(conn.exec(&[b"TTL", key])?)? {
            -2 => Ok(ClientTtl::Missing),
            -1 => Ok(ClientTtl::NoExpiry),
            value if value >= 0 => Ok(ClientTtl::ExpiresIn(Duration::from_secs(value as u64))),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    // -- lists -------------------------------------------------------------

    pub fn lpush(&self, key: &[u8], values: &[&[u8]]) -> ClientResult<i64> {
        let mut args = vec![&b"LPUSH"[..], key];
        args.extend_from_slice(values);
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&args)?)
    }

    pub fn rpush(&self, key: &[u8], values: &[&[u8]]) -> ClientResult<i64> {
        let mut args = vec![&b"RPUSH"[..], key];
        args.extend_from_slice(values);
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&args)?)
    }

    pub fn lpop(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        expect_bulk(conn.exec(&[b"LPOP", key])?)
    }

    pub fn rpop(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        expect_bulk(conn.exec(&[b"RPOP", key])?)
    }

    pub fn llen(&self, key: &[u8]) -> ClientResult<i64> {
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&[b"LLEN", key])?)
    }

    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let (start_buf, start_len) = encode_i64(start);
        let (stop_buf, stop_len) = encode_i64(stop);
        let mut conn = self.pool.acquire()?;
        expect_bulk_array(conn.exec(&[b"LRANGE", key, &start_buf[..start_len], &stop_buf[..stop_len]])?)
    }

    // -- hashes ------------------------------------------------------------

    pub fn hset(&self, key: &[u8], field: &[u8], value: &[u8]) -> ClientResult<i64> {
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&[b"HSET", key, field, value])?)
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        expect_bulk(conn.exec(&[b"HGET", key, field])?)
    }

    pub fn hdel(&self, key: &[u8], field: &[u8]) -> ClientResult<bool> {
        let mut conn = self.pool.acquire()?;
        Ok(expect_integer(conn.exec(&[b"HDEL", key, field])?)? > 0)
    }

    pub fn hgetall(&self, key: &[u8]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let mut conn = self.pool.acquire()?;
        expect_bulk_array(conn.exec(&[b"HGETALL", key])?)
    }

    pub fn hlen(&self, key: &[u8]) -> ClientResult<i64> {
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&[b"HLEN", key])?)
    }

    // -- sets ----------------------------------------------------------------

    pub fn sadd(&self, key: &[u8], members: &[&[u8]]) -> ClientResult<i64> {
        let mut args = vec![&b"SADD"[..], key];
        args.extend_from_slice(members);
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&args)?)
    }

    pub fn srem(&self, key: &[u8], members: &[&[u8]]) -> ClientResult<i64> {
        let mut args = vec![&b"SREM"[..], key];
        args.extend_from_slice(members);
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&args)?)
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> ClientResult<bool> {
        let mut conn = self.pool.acquire()?;
        Ok(expect_integer(conn.exec(&[b"SISMEMBER", key, member])?)? == 1)
    }

    pub fn smembers(&self, key: &[u8]) -> ClientResult<Vec<Option<Vec<u8>>>> {
        let mut conn = self.pool.acquire()?;
        expect_bulk_array(conn.exec(&[b"SMEMBERS", key])?)
    }

    pub fn scard(&self, key: &[u8]) -> ClientResult<i64> {
        let mut conn = self.pool.acquire()?;
        expect_integer(conn.exec(&[b"SCARD", key])?)
    }
}

fn encode_u64(mut value: u64) -> ([u8; 20], usize) {
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        return (buf, 1);
    }
    while value > 0 {
        buf[len] = b'0' + (value % 10) as u8;
        value /= 10;
        len += 1;
    }
    buf[..len].reverse();
    (buf, len)
}

fn encode_i64(value: i64) -> ([u8; 21], usize) {
    let mut buf = [0u8; 21];
    if value < 0 {
        let (digits, len) = encode_u64(value.unsigned_abs());
        buf[0] = b'-';
        buf[1..1 + len].copy_from_slice(&digits[..len]);
        (buf, len + 1)
    } else {
        let (digits, len) = encode_u64(value as u64);
        buf[..len].copy_from_slice(&digits[..len]);
        (buf, len)
    }
}
