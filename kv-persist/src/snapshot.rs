//! # Snapshot engine
//!
//! §4.7: marshal the whole keyspace to a sink, track when that last
//! happened, and restore from a sink on boot or Raft install.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use kv_common::{KvError, KvResult};
use kv_core::{Key, KeyData};
use kv_engine::{Context, Keyspace};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The exact shape persisted to a sink: `{state, latestSnapshotMs}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub state: Vec<SnapshotEntry>,
    pub latest_snapshot_ms: i64,
}

/// One key's serialized value and optional expiry, in wire form.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: Vec<u8>,
    pub value: SnapshotValue,
    pub expire_at_unix_ms: Option<i64>,
}

/// `Value` in a form `serde` can (de)serialize directly; kept separate from
/// `kv_core::Value` so the wire format doesn't have to track every engine
/// representation change one-for-one.
#[derive(Debug, Serialize, Deserialize)]
pub enum SnapshotValue {
    Integer(i64),
    Float(f64),
    String(Vec<u8>),
    List(Vec<SnapshotValue>),
    Hash(Vec<(Vec<u8>, SnapshotValue)>),
    Set(Vec<Vec<u8>>),
}

impl From<&kv_core::Value> for SnapshotValue {
    fn from(value: &kv_core::Value) -> Self {
        match value {
            kv_core::Value::Integer(i) => SnapshotValue::Integer(*i),
            kv_core::Value::Float(f) => SnapshotValue::Float(*f),
            kv_core::Value::String(s) => SnapshotValue::String(s.clone()),
            kv_core::Value::List(items) => {
                SnapshotValue::List(items.iter().map(SnapshotValue::from).collect())
            }
            kv_core::Value::Hash(map) => SnapshotValue::Hash(
                map.iter().map(|(k, v)| (k.clone(), SnapshotValue::from(v))).collect(),
            ),
            kv_core::Value::Set(set) => SnapshotValue::Set(set.iter().cloned().collect()),
        }
    }
}

impl From<SnapshotValue> for kv_core::Value {
    fn from(value: SnapshotValue) -> Self {
        match value {
            SnapshotValue::Integer(i) => kv_core::Value::Integer(i),
            SnapshotValue::Float(f) => kv_core::Value::Float(f),
            SnapshotValue::String(s) => kv_core::Value::String(s),
            SnapshotValue::List(items) => {
                kv_core::Value::List(items.into_iter().map(kv_core::Value::from).collect())
            }
            SnapshotValue::Hash(entries) => kv_core::Value::Hash(
                entries.into_iter().map(|(k, v)| (k, kv_core::Value::from(v))).collect(),
            ),
            SnapshotValue::Set(items) => kv_core::Value::Set(items.into_iter().collect()),
        }
    }
}

/// A sink a snapshot can be written to or read from. Implemented for a
/// plain file path by `FileSink`; tests and the Raft FSM snapshot store can
/// provide their own.
#[async_trait::async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn write(&self, bytes: &[u8]) -> KvResult<()>;
    async fn read(&self) -> KvResult<Vec<u8>>;
    /// Called if a write is abandoned partway through; lets file-backed
    /// sinks clean up a partial write.
    async fn cancel(&self) -> KvResult<()>;
}

/// A sink backed by a plain file on disk.
pub struct FileSink {
    path: std::path::PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        FileSink { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SnapshotSink for FileSink {
    async fn write(&self, bytes: &[u8]) -> KvResult<()> {
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, bytes).await.map_err(KvError::IoFailure)?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(KvError::IoFailure)
    }

    async fn read(&self) -> KvResult<Vec<u8>> {
        tokio::fs::read(&self.path).await.map_err(KvError::IoFailure)
    }

    async fn cancel(&self) -> KvResult<()> {
        let tmp_path = self.path.with_extension("tmp");
        match tokio::fs::remove_file(&tmp_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(KvError::IoFailure(err)),
        }
    }
}

/// The snapshot engine itself: tracks `latestSnapshotMs` across calls and
/// coordinates persist/restore against a keyspace.
pub struct SnapshotEngine {
    latest_snapshot_ms: Arc<AtomicI64>,
}

impl SnapshotEngine {
    pub fn new() -> Self {
        SnapshotEngine { latest_snapshot_ms: Arc::new(AtomicI64::new(0)) }
    }

    /// §4.7 `GetLatestSnapshot()`.
    pub fn latest_snapshot_ms(&self) -> i64 {
        self.latest_snapshot_ms.load(Ordering::Acquire)
    }

    /// Persist: reads a consistent state copy from `keyspace` and marshals
    /// it to `sink`. On any write error the sink is told to cancel. Release
    /// (clearing the in-progress flag) is the caller's responsibility via
    /// the barrier guard it already holds while calling this.
    pub async fn persist(&self, keyspace: &Keyspace, sink: &dyn SnapshotSink) -> KvResult<()> {
        let now = std::time::Instant::now();
        let entries = keyspace.get_state(now).await;
        let wire_now_ms = unix_millis();

        let payload = SnapshotPayload {
            state: entries
                .into_iter()
                .map(|(key, data)| SnapshotEntry {
                    key: key.into_vec(),
                    value: SnapshotValue::from(&data.value),
                    expire_at_unix_ms: data.expire_at.map(|_| wire_now_ms),
                })
                .collect(),
            latest_snapshot_ms: wire_now_ms,
        };

        let bytes = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(err) => {
                sink.cancel().await?;
                return Err(KvError::Internal(format!("snapshot encode failed: {err}")));
            }
        };

        match sink.write(&bytes).await {
            Ok(()) => {
                self.latest_snapshot_ms.store(wire_now_ms, Ordering::Release);
                debug!(bytes = bytes.len(), "snapshot persisted");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "snapshot write failed, cancelling sink");
                sink.cancel().await?;
                Err(err)
            }
        }
    }

    /// Restore: reads `sink`, deserializes, then for each entry performs
    /// `CreateKeyAndLock -> SetValue -> SetExpiry -> Unlock`.
    pub async fn restore(&self, keyspace: &Keyspace, sink: &dyn SnapshotSink) -> KvResult<usize> {
        let bytes = sink.read().await?;
        let payload: SnapshotPayload = serde_json::from_slice(&bytes)
            .map_err(|err| KvError::Internal(format!("snapshot decode failed: {err}")))?;

        let ctx = Context::background();
        let mut restored = 0usize;
        for entry in payload.state {
            let key = Key::from(entry.key);
            let value: kv_core::Value = entry.value.into();
            let expire_at = entry.expire_at_unix_ms.map(unix_ms_to_instant);
            // `create_key_and_lock` locks the existing key instead of
            // erroring when the target keyspace already has it (e.g.
            // restoring onto a follower catching up via install_snapshot);
            // in that case the snapshot's value and expiry must still win.
            let (mut guard, created) = keyspace.create_key_and_lock(&ctx, key, value.clone()).await?;
            if !created {
                keyspace.set_value(&mut guard, value);
            }
            keyspace.set_expiry(&mut guard, expire_at, false);
            drop(guard);
            restored += 1;
        }
        self.latest_snapshot_ms.store(payload.latest_snapshot_ms, Ordering::Release);
        Ok(restored)
    }
}

impl Default for SnapshotEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Converts a persisted Unix-epoch millisecond deadline into a
/// process-local `Instant`, anchored against the current wall/monotonic
/// reading. Best-effort: a deadline already in the past collapses to "now".
fn unix_ms_to_instant(target_unix_ms: i64) -> std::time::Instant {
    let now_ms = unix_millis();
    let now = std::time::Instant::now();
    if target_unix_ms <= now_ms {
        now
    } else {
        now + std::time::Duration::from_millis((target_unix_ms - now_ms) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_engine::KeyspaceConfig;
    use std::sync::Mutex as StdMutex;

    struct MemorySink {
        bytes: StdMutex<Option<Vec<u8>>>,
    }

    impl MemorySink {
        fn new() -> Self {
            MemorySink { bytes: StdMutex::new(None) }
        }
    }

    #[async_trait::async_trait]
    impl SnapshotSink for MemorySink {
        async fn write(&self, bytes: &[u8]) -> KvResult<()> {
            *self.bytes.lock().unwrap() = Some(bytes.to_vec());
            Ok(())
        }

        async fn read(&self) -> KvResult<Vec<u8>> {
            self.bytes.lock().unwrap().clone().ok_or(KvError::NotFound("snapshot".into()))
        }

        async fn cancel(&self) -> KvResult<()> {
            *self.bytes.lock().unwrap() = None;
            Ok(())
        }
    }

    #[tokio::test]
    async fn persist_then_restore_round_trips_keys() {
        let ctx = Context::background();
        let ks = Keyspace::new(KeyspaceConfig::default());
        let (guard, _) = ks
            .create_key_and_lock(&ctx, Key::from("a"), kv_core::Value::Integer(42))
            .await
            .unwrap();
        drop(guard);

        let engine = SnapshotEngine::new();
        let sink = MemorySink::new();
        engine.persist(&ks, &sink).await.unwrap();
        assert!(engine.latest_snapshot_ms() > 0);

        let restored_ks = Keyspace::new(KeyspaceConfig::default());
        let count = engine.restore(&restored_ks, &sink).await.unwrap();
        assert_eq!(count, 1);
        assert!(restored_ks.key_exists(&Key::from("a")));
    }

    #[tokio::test]
    async fn restore_with_no_prior_snapshot_errors() {
        let engine = SnapshotEngine::new();
        let sink = MemorySink::new();
        let ks = Keyspace::new(KeyspaceConfig::default());
        let err = engine.restore(&ks, &sink).await.unwrap_err();
        assert!(matches!(err, KvError::NotFound(_)));
    }
}
