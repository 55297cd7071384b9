//! # Finite state machine
//!
//! Applies committed Raft log entries to the keyspace by routing the
//! embedded RESP frame through the same command handlers a standalone node
//! uses (§4.4's handler layer), skipping ACL (already checked by the
//! proposing node) and AOF (durability in clustered mode comes from the
//! Raft log itself plus periodic snapshots, not a local append file).

use std::io::Cursor;
use std::sync::Arc;

use kv_acl::{AclStore, AclUserBuilder};
use kv_command::registry::CommandRegistry;
use kv_command::{decode_frame, handlers};
use kv_common::{KvError, KvResult};
use kv_engine::{Context, Keyspace};
use kv_persist::{SnapshotEngine, SnapshotSink};
use openraft::{
    EntryPayload, LogId, OptionalSend, RaftSnapshotBuilder, Snapshot, SnapshotMeta,
    StorageError, StoredMembership,
};
use tokio::sync::Mutex;

use super::types::{ClusterRequest, ClusterResponse, TypeConfig};

/// Applies committed writes to the keyspace; the `openraft::RaftStateMachine`
/// impl below is a thin adapter over this.
pub struct Fsm {
    keyspace: Keyspace,
    registry: CommandRegistry,
    acl: AclStore,
    snapshot: SnapshotEngine,
    sink: Arc<dyn SnapshotSink>,
    last_applied: Mutex<Option<LogId<u64>>>,
    membership: Mutex<StoredMembership<TypeConfig>>,
}

impl Fsm {
    pub fn new(keyspace: Keyspace, sink: Arc<dyn SnapshotSink>) -> Self {
        let acl = AclStore::new();
        acl.insert_user(AclUserBuilder::new("raft-internal").root().nopass().build());
        Fsm {
            keyspace,
            registry: CommandRegistry::new(),
            acl,
            snapshot: SnapshotEngine::new(),
            sink,
            last_applied: Mutex::new(None),
            membership: Mutex::new(StoredMembership::default()),
        }
    }

    /// Decodes `frame` and runs it through the standard handler dispatch
    /// (bypassing ACL and AOF routing, both already handled upstream).
    pub async fn apply_frame(&self, frame: &[u8]) -> KvResult<Vec<u8>> {
        let mut buf = bytes::BytesMut::from(frame);
        let argv = decode_frame(&mut buf)?.ok_or(KvError::ProtocolError)?;
        if argv.is_empty() {
            return Err(KvError::ProtocolError);
        }
        let command = self.registry.lookup(&argv[0])?;
        let ctx = Context::background();
        let env = handlers::HandlerEnv {
            keyspace: &self.keyspace,
            ctx: &ctx,
            acl: &self.acl,
            registry: &self.registry,
            aof: None,
            snapshot: &self.snapshot,
            snapshot_sink: self.sink.as_ref(),
            server_id: "raft-fsm",
        };
        handlers::execute(&env, command.handler, &argv).await
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }
}

/// Builds an `openraft` snapshot by persisting the keyspace through the
/// shared snapshot engine (§4.7) and reading the bytes back.
pub struct FsmSnapshotBuilder {
    keyspace: Keyspace,
    snapshot: Arc<SnapshotEngine>,
    sink: Arc<dyn SnapshotSink>,
}

#[async_trait::async_trait]
impl RaftSnapshotBuilder<TypeConfig> for FsmSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<u64>> {
        self.snapshot.persist(&self.keyspace, self.sink.as_ref()).await.map_err(|err| {
            StorageError::IO { source: openraft::StorageIOError::write_snapshot(None, &err) }
        })?;
        let bytes = self.sink.read().await.map_err(|err| StorageError::IO {
            source: openraft::StorageIOError::read_snapshot(None, &err),
        })?;
        let meta = SnapshotMeta {
            last_log_id: None,
            last_membership: StoredMembership::default(),
            snapshot_id: format!("snapshot-{}", self.snapshot.latest_snapshot_ms()),
        };
        Ok(Snapshot { meta, snapshot: Box::new(Cursor::new(bytes)) })
    }
}

#[async_trait::async_trait]
impl openraft::RaftStateMachine<TypeConfig> for Fsm {
    type SnapshotBuilder = FsmSnapshotBuilder;

    async fn applied_state(
        &mut self,
    ) -> Result<(Option<LogId<u64>>, StoredMembership<TypeConfig>), StorageError<u64>> {
        Ok((*self.last_applied.lock().await, self.membership.lock().await.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<ClusterResponse>, StorageError<u64>>
    where
        I: IntoIterator<Item = openraft::Entry<TypeConfig>> + OptionalSend,
    {
        let mut replies = Vec::new();
        for entry in entries {
            *self.last_applied.lock().await = Some(entry.log_id);
            let reply = match entry.payload {
                EntryPayload::Blank => Vec::new(),
                EntryPayload::Normal(ClusterRequest::ApplyCommand { frame, .. }) => {
                    self.apply_frame(&frame).await.unwrap_or_else(|err| {
                        kv_command::resp::encode_kv_error(&err)
                    })
                }
                EntryPayload::Normal(ClusterRequest::DeleteKey { key, .. }) => {
                    self.keyspace.delete_key_by_name(&kv_core::Key::from(key));
                    kv_command::resp::encode_simple("OK")
                }
                EntryPayload::Membership(ref membership) => {
                    *self.membership.lock().await =
                        StoredMembership::new(Some(entry.log_id), membership.clone());
                    Vec::new()
                }
            };
            replies.push(ClusterResponse { reply });
        }
        Ok(replies)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        FsmSnapshotBuilder {
            keyspace: self.keyspace.clone(),
            snapshot: Arc::new(SnapshotEngine::new()),
            sink: self.sink.clone(),
        }
    }

    async fn begin_receiving_snapshot(&mut self) -> Result<Box<Cursor<Vec<u8>>>, StorageError<u64>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<TypeConfig>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<u64>> {
        let bytes = snapshot.into_inner();
        self.sink.write(&bytes).await.map_err(|err| StorageError::IO {
            source: openraft::StorageIOError::write_snapshot(None, &err),
        })?;
        self.snapshot.restore(&self.keyspace, self.sink.as_ref()).await.map_err(|err| {
            StorageError::IO { source: openraft::StorageIOError::read_snapshot(None, &err) }
        })?;
        *self.last_applied.lock().await = meta.last_log_id;
        *self.membership.lock().await = meta.last_membership.clone();
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot<TypeConfig>>, StorageError<u64>> {
        match self.sink.read().await {
            Ok(bytes) => Ok(Some(Snapshot {
                meta: SnapshotMeta {
                    last_log_id: *self.last_applied.lock().await,
                    last_membership: self.membership.lock().await.clone(),
                    snapshot_id: format!("snapshot-{}", self.snapshot.latest_snapshot_ms()),
                },
                snapshot: Box::new(Cursor::new(bytes)),
            })),
            Err(_) => Ok(None),
        }
    }
}
