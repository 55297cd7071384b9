//! # kv-client
//!
//! A lightweight, synchronous client with connection pooling to minimize
//! TCP handshake overhead against the RESP-compatible server.

mod client;
mod pool;
mod resp;

pub use client::{ClientConfig, ClientError, ClientResult, ClientTtl, KVClient};
pub use resp::RespValue;
