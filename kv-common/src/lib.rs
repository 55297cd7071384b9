// kv-common - Shared error types and identifiers used across the workspace
//
// This crate has no domain logic of its own; it exists so that kv-core,
// kv-engine, kv-acl, kv-persist, kv-cluster, kv-command, and kv-server all
// agree on one error type and one set of connection/server identifiers.

pub mod error;
pub mod ids;

pub use error::{KvError, KvResult};
pub use ids::{ConnectionId, ConnectionIdAllocator, ServerId, REPLAY_CONNECTION_ID};
