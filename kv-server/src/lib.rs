//! # kv-server
//!
//! The connection server (§4.11): accept loop, TLS, pub/sub interface,
//! metrics, and CLI/file configuration (C10–C14). Standalone or clustered
//! mode is decided at startup by [`config::ServerConfig`] and wired into a
//! `kv_command::Dispatcher` in `main`.

pub mod config;
pub mod metrics;
pub mod pubsub;
pub mod server;
