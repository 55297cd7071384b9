//! # Raft integration
//!
//! Wires `openraft` into a running node: log storage (`store`), the
//! applied-state machine (`fsm`), RPC transport (`network`), and
//! configuration (`config`). [`ClusterNode`] is the public handle other
//! crates hold; it implements `kv_command::ClusterRouter` so the dispatch
//! pipeline can propose or forward writes without knowing anything about
//! Raft directly.

pub mod config;
pub mod fsm;
pub mod network;
pub mod store;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use kv_command::ClusterRouter;
use kv_common::{KvError, KvResult};
use kv_engine::Keyspace;
use kv_persist::SnapshotSink;
use openraft::{BasicNode, Raft};
use tokio::net::TcpListener;
use tracing::{info, warn};

use config::RaftConfig;
use fsm::Fsm;
use network::{PeerDirectory, TcpRaftNetworkFactory};
use store::SledLogStore;
use types::{ClusterRequest, TypeConfig};

/// A running Raft node plus everything needed to route writes through it.
pub struct ClusterNode {
    raft: Raft<TypeConfig>,
    config: RaftConfig,
    directory: Arc<PeerDirectory>,
}

impl ClusterNode {
    /// Opens (or creates) the sled log database, builds the FSM over
    /// `keyspace`, and starts the `openraft::Raft` runtime. Does not bind
    /// the RPC listener; call [`ClusterNode::serve`] for that once built.
    pub async fn start(
        config: RaftConfig,
        keyspace: Keyspace,
        snapshot_sink: Arc<dyn SnapshotSink>,
    ) -> KvResult<Self> {
        let db = if config.in_memory {
            sled::Config::new().temporary(true).open()
        } else {
            sled::open(&config.data_dir)
        }
        .map_err(|err| KvError::Internal(format!("sled open failed: {err}")))?;

        let log_store = SledLogStore::new(&db)?;
        let fsm = Fsm::new(keyspace, snapshot_sink);
        let directory = Arc::new(PeerDirectory::new());
        let network = TcpRaftNetworkFactory::new(directory.clone());

        let raft = Raft::new(
            config.local_id,
            Arc::new(config.to_openraft_config()),
            network,
            log_store,
            fsm,
        )
        .await
        .map_err(|err| KvError::Internal(format!("raft init failed: {err}")))?;

        if config.bootstrap_cluster {
            let mut members = std::collections::BTreeMap::new();
            members.insert(
                config.local_id,
                BasicNode { addr: config.raft_bind_addr.to_string() },
            );
            raft.initialize(members)
                .await
                .map_err(|err| KvError::Internal(format!("raft bootstrap failed: {err}")))?;
        }

        Ok(ClusterNode { raft, config, directory })
    }

    /// Accepts inbound Raft RPC connections until the listener is dropped.
    pub async fn serve(&self) -> KvResult<()> {
        let listener = TcpListener::bind(self.config.raft_bind_addr).await.map_err(KvError::IoFailure)?;
        info!(addr = %self.config.raft_bind_addr, "raft rpc listener bound");
        loop {
            let (stream, peer) = listener.accept().await.map_err(KvError::IoFailure)?;
            let raft = self.raft.clone();
            tokio::spawn(async move {
                if let Err(err) = network::serve_connection(stream, raft).await {
                    warn!(%peer, error = %err, "raft rpc connection failed");
                }
            });
        }
    }

    pub async fn add_voter(&self, id: u64, addr: std::net::SocketAddr) -> KvResult<()> {
        let node = BasicNode { addr: addr.to_string() };
        self.directory.set(id, node.clone()).await;
        self.raft
            .add_learner(id, node, true)
            .await
            .map_err(|err| KvError::Internal(format!("add_learner failed: {err}")))?;
        let members: Vec<u64> = self.current_members().await;
        self.raft
            .change_membership(members, false)
            .await
            .map_err(|err| KvError::Internal(format!("change_membership failed: {err}")))?;
        Ok(())
    }

    pub async fn remove_server(&self, id: u64) -> KvResult<()> {
        let mut members = self.current_members().await;
        members.retain(|m| *m != id);
        self.raft
            .change_membership(members, false)
            .await
            .map_err(|err| KvError::Internal(format!("change_membership failed: {err}")))?;
        Ok(())
    }

    async fn current_members(&self) -> Vec<u64> {
        self.raft.metrics().borrow().membership_config.membership().voter_ids().collect()
    }

    pub async fn take_snapshot(&self) -> KvResult<()> {
        self.raft
            .trigger()
            .snapshot()
            .await
            .map_err(|err| KvError::Internal(format!("snapshot trigger failed: {err}")))
    }

    pub fn is_leader(&self) -> bool {
        self.raft.metrics().borrow().current_leader == Some(self.config.local_id)
    }

    pub fn current_leader_addr(&self) -> Option<String> {
        let metrics = self.raft.metrics();
        let leader_id = metrics.borrow().current_leader?;
        metrics
            .borrow()
            .membership_config
            .membership()
            .get_node(&leader_id)
            .map(|node| node.addr.clone())
    }

    /// Gracefully steps down: if leading, asks `openraft` to transfer
    /// leadership before the caller shuts the process down.
    pub async fn shutdown(&self) -> KvResult<()> {
        if self.is_leader() {
            let _ = self.raft.trigger().transfer_leader(None).await;
        }
        self.raft
            .shutdown()
            .await
            .map_err(|err| KvError::Internal(format!("raft shutdown failed: {err}")))
    }
}

#[async_trait]
impl ClusterRouter for ClusterNode {
    fn is_leader(&self) -> bool {
        ClusterNode::is_leader(self)
    }

    async fn propose_write(&self, frame: &[u8]) -> KvResult<Vec<u8>> {
        let request = ClusterRequest::ApplyCommand {
            server_id: self.config.local_id,
            conn_id: 0,
            frame: frame.to_vec(),
        };
        let response = self
            .raft
            .client_write(request)
            .await
            .map_err(|err| KvError::Internal(format!("raft propose failed: {err}")))?;
        Ok(response.data.reply)
    }

    fn can_forward(&self) -> bool {
        self.current_leader_addr().is_some()
    }

    async fn forward_write(&self, frame: &[u8]) -> KvResult<Vec<u8>> {
        let Some(addr) = self.current_leader_addr() else { return Err(KvError::NotLeader) };
        let mut stream = tokio::net::TcpStream::connect(&addr).await.map_err(KvError::IoFailure)?;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let envelope = serde_json::json!({ "rpc": "forward_write", "body": frame });
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|err| KvError::Internal(format!("forward encode failed: {err}")))?;
        stream.write_u32_le(bytes.len() as u32).await.map_err(KvError::IoFailure)?;
        stream.write_all(&bytes).await.map_err(KvError::IoFailure)?;
        let len = stream.read_u32_le().await.map_err(KvError::IoFailure)? as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.map_err(KvError::IoFailure)?;
        serde_json::from_slice(&buf)
            .map_err(|err| KvError::Internal(format!("forward decode failed: {err}")))
    }
}
