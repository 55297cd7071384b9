//! # kv-engine
//!
//! The in-memory keyspace engine: per-key locking, lazy lock lifecycle,
//! eviction policies, TTL expiry, and the state-copy barrier that lets the
//! persistence layer take a consistent snapshot without a global stop.

pub mod barrier;
pub mod context;
pub mod eviction;
pub mod keyspace;

pub use barrier::{CopyGuard, MutationGuard, StateCopyBarrier};
pub use context::Context;
pub use eviction::{EvictionKind, EvictionTracker};
pub use keyspace::{KeyReadGuard, Keyspace, KeyspaceConfig, KeyWriteGuard};
