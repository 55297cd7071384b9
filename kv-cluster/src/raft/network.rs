//! # Raft network
//!
//! RPC transport between cluster nodes: a plain TCP connection per call,
//! framed the same way the append-only file frames records (a `u32` LE
//! length prefix followed by a `serde_json`-encoded payload), rather than
//! pulling in a full RPC framework for three call shapes.

use std::collections::HashMap;
use std::sync::Arc;

use kv_common::KvError;
use openraft::error::{InstallSnapshotError, RPCError, RaftError};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::BasicNode;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::warn;

use super::types::{ClusterRequest, TypeConfig};

/// Known peer addresses, keyed by node id; updated as membership changes so
/// `RaftNetworkFactory::new_client` always dials the latest address.
#[derive(Default)]
pub struct PeerDirectory {
    peers: RwLock<HashMap<u64, BasicNode>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        PeerDirectory::default()
    }

    pub async fn set(&self, id: u64, node: BasicNode) {
        self.peers.write().await.insert(id, node);
    }

    pub async fn get(&self, id: u64) -> Option<BasicNode> {
        self.peers.read().await.get(&id).cloned()
    }
}

async fn send_rpc<Req, Resp>(addr: &str, rpc_name: &str, req: &Req) -> Result<Resp, KvError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = TcpStream::connect(addr).await.map_err(KvError::IoFailure)?;
    let envelope = serde_json::json!({ "rpc": rpc_name, "body": req });
    let bytes = serde_json::to_vec(&envelope)
        .map_err(|err| KvError::Internal(format!("raft rpc encode failed: {err}")))?;
    stream.write_u32_le(bytes.len() as u32).await.map_err(KvError::IoFailure)?;
    stream.write_all(&bytes).await.map_err(KvError::IoFailure)?;

    let len = stream.read_u32_le().await.map_err(KvError::IoFailure)? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(KvError::IoFailure)?;
    serde_json::from_slice(&buf).map_err(|err| KvError::Internal(format!("raft rpc decode failed: {err}")))
}

/// One `RaftNetwork` connection to a single remote node, dialed fresh per
/// call (no persistent connection pool; calls are infrequent relative to a
/// TCP handshake's cost at cluster scale).
pub struct TcpRaftNetwork {
    target: u64,
    addr: String,
}

#[async_trait::async_trait]
impl RaftNetwork<TypeConfig> for TcpRaftNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<u64>, RPCError<u64, BasicNode, RaftError<u64>>> {
        send_rpc(&self.addr, "append_entries", &rpc)
            .await
            .map_err(|err| RPCError::Network(openraft::error::NetworkError::new(&err)))
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<InstallSnapshotResponse<u64>, RPCError<u64, BasicNode, RaftError<u64, InstallSnapshotError>>>
    {
        send_rpc(&self.addr, "install_snapshot", &rpc)
            .await
            .map_err(|err| RPCError::Network(openraft::error::NetworkError::new(&err)))
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<u64>,
        _option: RPCOption,
    ) -> Result<VoteResponse<u64>, RPCError<u64, BasicNode, RaftError<u64>>> {
        send_rpc(&self.addr, "vote", &rpc)
            .await
            .map_err(|err| RPCError::Network(openraft::error::NetworkError::new(&err)))
    }

    /// Notifies this network of the target node's current known address,
    /// called by `openraft` whenever membership changes. We resolve the
    /// address lazily from the shared directory instead, so this is a no-op.
    fn backoff(&self) -> openraft::network::Backoff {
        openraft::network::Backoff::default()
    }
}

/// Builds a [`TcpRaftNetwork`] for each target node on demand, resolving
/// addresses from the shared [`PeerDirectory`].
pub struct TcpRaftNetworkFactory {
    directory: Arc<PeerDirectory>,
}

impl TcpRaftNetworkFactory {
    pub fn new(directory: Arc<PeerDirectory>) -> Self {
        TcpRaftNetworkFactory { directory }
    }
}

#[async_trait::async_trait]
impl RaftNetworkFactory<TypeConfig> for TcpRaftNetworkFactory {
    type Network = TcpRaftNetwork;

    async fn new_client(&mut self, target: u64, node: &BasicNode) -> Self::Network {
        self.directory.set(target, node.clone()).await;
        TcpRaftNetwork { target, addr: node.addr.clone() }
    }
}

/// Handles one inbound RPC connection on the Raft listener, dispatching by
/// the `rpc` field in the envelope to the matching `openraft::Raft` method.
pub async fn serve_connection(
    mut stream: TcpStream,
    raft: openraft::Raft<TypeConfig>,
) -> Result<(), KvError> {
    let len = stream.read_u32_le().await.map_err(KvError::IoFailure)? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(KvError::IoFailure)?;
    let envelope: serde_json::Value = serde_json::from_slice(&buf)
        .map_err(|err| KvError::Internal(format!("raft rpc decode failed: {err}")))?;

    let rpc = envelope.get("rpc").and_then(|v| v.as_str()).unwrap_or_default();
    let body = envelope.get("body").cloned().unwrap_or(serde_json::Value::Null);

    let reply = match rpc {
        "append_entries" => {
            let req: AppendEntriesRequest<TypeConfig> = serde_json::from_value(body)
                .map_err(|err| KvError::Internal(err.to_string()))?;
            serde_json::to_vec(&raft.append_entries(req).await.map_err(|err| {
                KvError::Internal(err.to_string())
            })?)
        }
        "install_snapshot" => {
            let req: InstallSnapshotRequest<TypeConfig> = serde_json::from_value(body)
                .map_err(|err| KvError::Internal(err.to_string()))?;
            serde_json::to_vec(&raft.install_snapshot(req).await.map_err(|err| {
                KvError::Internal(err.to_string())
            })?)
        }
        "vote" => {
            let req: VoteRequest<u64> = serde_json::from_value(body)
                .map_err(|err| KvError::Internal(err.to_string()))?;
            serde_json::to_vec(&raft.vote(req).await.map_err(|err| KvError::Internal(err.to_string()))?)
        }
        // A non-leader forwarded a client write here. Propose it through
        // this node's own Raft log exactly as if a local client had issued
        // it, and hand back the reply the FSM produced once committed.
        "forward_write" => {
            let frame: Vec<u8> = serde_json::from_value(body)
                .map_err(|err| KvError::Internal(err.to_string()))?;
            let request = ClusterRequest::ApplyCommand { server_id: 0, conn_id: 0, frame };
            let response = raft
                .client_write(request)
                .await
                .map_err(|err| KvError::Internal(err.to_string()))?;
            serde_json::to_vec(&response.data.reply)
        }
        other => {
            warn!(rpc = other, "unknown raft rpc");
            return Err(KvError::ProtocolError);
        }
    };

    let bytes = reply.map_err(|err| KvError::Internal(format!("raft rpc reply encode failed: {err}")))?;
    stream.write_u32_le(bytes.len() as u32).await.map_err(KvError::IoFailure)?;
    stream.write_all(&bytes).await.map_err(KvError::IoFailure)
}
