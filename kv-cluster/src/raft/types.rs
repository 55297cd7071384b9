//! # Raft type configuration
//!
//! Declares the associated types `openraft` needs for this application: the
//! request/response payloads carried by the log, and the node identity
//! types. Kept in its own module since `declare_raft_types!` expands to a
//! handful of type aliases that every other `raft` submodule imports.

use std::io::Cursor;

use serde::{Deserialize, Serialize};

/// One write committed through the log: a raw RESP-encoded command frame
/// already accepted by ACL and dispatch on the proposing node (§4.4 step 5,
/// §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterRequest {
    /// Apply a write command's effect to the keyspace.
    ApplyCommand { server_id: u64, conn_id: u64, frame: Vec<u8> },
    /// Delete a key directly, used for TTL-driven tombstones that must be
    /// replicated rather than left to each node's own expiry sweep.
    DeleteKey { server_id: u64, conn_id: u64, key: Vec<u8> },
}

/// Reply carried back from `Fsm::apply` for a committed entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResponse {
    pub reply: Vec<u8>,
}

openraft::declare_raft_types!(
    /// The type configuration instantiating every `openraft` generic for
    /// this crate.
    pub TypeConfig:
        D = ClusterRequest,
        R = ClusterResponse,
        NodeId = u64,
        Node = openraft::BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
);
