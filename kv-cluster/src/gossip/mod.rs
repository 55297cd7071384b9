//! # Gossip membership
//!
//! Cluster membership discovery, separate from the Raft log: nodes learn
//! about each other and exchange join/leave intent here, then the leader
//! acts on that intent by adding or removing Raft voters (§4.9's "nodes
//! additionally run gossip" ambient layer).

pub mod messages;
pub mod node;

pub use messages::{GossipMessage, NodeMeta};
pub use node::GossipNode;
