//! # kv-cluster
//!
//! Raft-backed replication (§4.9) and gossip-based membership discovery
//! for clustered mode. [`raft::ClusterNode`] is the handle `kv-server`
//! builds at startup and hands to `kv-command`'s dispatcher as a
//! `ClusterRouter`.

pub mod gossip;
pub mod raft;

pub use gossip::{GossipNode, NodeMeta};
pub use raft::config::RaftConfig;
pub use raft::ClusterNode;
