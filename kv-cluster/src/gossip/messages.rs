//! # Gossip message types
//!
//! Payloads exchanged over the membership layer. Distinct from
//! [`crate::raft::types::ClusterRequest`]: gossip broadcasts are
//! best-effort membership/metadata chatter, not replicated log entries.

use serde::{Deserialize, Serialize};

/// Metadata a node advertises about itself on joining the gossip ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMeta {
    pub server_id: u64,
    pub raft_addr: std::net::SocketAddr,
    pub gossip_addr: std::net::SocketAddr,
}

/// Application-level broadcasts carried over the gossip transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    /// Announces a node has joined and wants to be added as a Raft voter.
    RaftJoin { node: NodeMeta },
    /// Announces a node is leaving cleanly.
    RaftLeave { server_id: u64 },
}
