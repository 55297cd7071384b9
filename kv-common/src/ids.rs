//! # Identifiers
//!
//! Server-local and cluster-local identifiers threaded through the command
//! pipeline, the Raft log, and gossip broadcasts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id for a single accepted TCP/TLS connection.
///
/// Scoped to this process only; never persisted or compared across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Allocates process-unique `ConnectionId`s.
#[derive(Debug, Default)]
pub struct ConnectionIdAllocator {
    next: AtomicU64,
}

impl ConnectionIdAllocator {
    /// Creates a fresh allocator starting at id 1 (0 is reserved for
    /// internally-generated connections such as AOF replay).
    pub fn new() -> Self {
        ConnectionIdAllocator { next: AtomicU64::new(1) }
    }

    /// Returns the next unique id.
    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stable identity of a node within the Raft/gossip cluster.
///
/// Configured at boot (`--server-id`), not generated, so it survives restarts
/// and is how peers recognize "the same node" after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub String);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection id reserved for commands replayed from the AOF or applied via
/// Raft on a follower that did not originate the write.
pub const REPLAY_CONNECTION_ID: ConnectionId = ConnectionId(0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_issues_unique_increasing_ids() {
        let alloc = ConnectionIdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert_ne!(a, b);
        assert!(b.0 > a.0);
    }

    #[test]
    fn replay_id_is_zero() {
        assert_eq!(REPLAY_CONNECTION_ID.0, 0);
    }
}
