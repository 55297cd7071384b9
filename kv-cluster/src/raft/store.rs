//! # Raft log storage
//!
//! Persists the Raft log and vote state in a `sled` tree, keyed by log
//! index. Chosen over a hand-rolled append file because the log needs
//! random access for truncation and purge, not just sequential writes —
//! `sled` already gives us that with crash-safe fsync semantics.

use std::ops::RangeBounds;

use kv_common::KvError;
use openraft::storage::{IOFlushed, LogState, RaftLogStorage, RaftLogReader};
use openraft::{Entry, LogId, OptionalSend, StorageError, Vote};

use super::types::TypeConfig;

const VOTE_KEY: &[u8] = b"__vote";

/// Log storage backed by a dedicated `sled::Tree`.
#[derive(Clone)]
pub struct SledLogStore {
    tree: sled::Tree,
}

impl SledLogStore {
    pub fn new(db: &sled::Db) -> Result<Self, KvError> {
        let tree = db.open_tree("raft_log").map_err(|err| KvError::Internal(err.to_string()))?;
        Ok(SledLogStore { tree })
    }

    fn index_key(index: u64) -> [u8; 8] {
        index.to_be_bytes()
    }

    fn decode_entry(bytes: &[u8]) -> Result<Entry<TypeConfig>, StorageError<u64>> {
        serde_json::from_slice(bytes)
            .map_err(|err| StorageError::IO { source: openraft::StorageIOError::read_logs(&err) })
    }
}

#[async_trait::async_trait]
impl RaftLogReader<TypeConfig> for SledLogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<u64>> {
        let mut entries = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item.map_err(|err| StorageError::IO {
                source: openraft::StorageIOError::read_logs(&err),
            })?;
            if key.as_ref() == VOTE_KEY {
                continue;
            }
            let index = u64::from_be_bytes(key.as_ref().try_into().unwrap_or_default());
            if range.contains(&index) {
                entries.push(Self::decode_entry(&value)?);
            }
        }
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl RaftLogStorage<TypeConfig> for SledLogStore {
    type LogReader = SledLogStore;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<u64>> {
        let mut last = None;
        for item in self.tree.iter() {
            let (key, value) = item.map_err(|err| StorageError::IO {
                source: openraft::StorageIOError::read_logs(&err),
            })?;
            if key.as_ref() == VOTE_KEY {
                continue;
            }
            let entry = Self::decode_entry(&value)?;
            last = Some(entry.log_id);
        }
        Ok(LogState { last_purged_log_id: None, last_log_id: last })
    }

    async fn save_vote(&mut self, vote: &Vote<u64>) -> Result<(), StorageError<u64>> {
        let bytes = serde_json::to_vec(vote)
            .map_err(|err| StorageError::IO { source: openraft::StorageIOError::write_vote(&err) })?;
        self.tree
            .insert(VOTE_KEY, bytes)
            .map_err(|err| StorageError::IO { source: openraft::StorageIOError::write_vote(&err) })?;
        self.tree.flush_async().await.map_err(|err| StorageError::IO {
            source: openraft::StorageIOError::write_vote(&err),
        })?;
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<u64>>, StorageError<u64>> {
        let Some(bytes) = self.tree.get(VOTE_KEY).map_err(|err| StorageError::IO {
            source: openraft::StorageIOError::read_vote(&err),
        })?
        else {
            return Ok(None);
        };
        let vote = serde_json::from_slice(&bytes)
            .map_err(|err| StorageError::IO { source: openraft::StorageIOError::read_vote(&err) })?;
        Ok(Some(vote))
    }

    async fn append<I>(&mut self, entries: I, callback: IOFlushed<TypeConfig>) -> Result<(), StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
    {
        for entry in entries {
            let bytes = serde_json::to_vec(&entry)
                .map_err(|err| StorageError::IO { source: openraft::StorageIOError::write_logs(&err) })?;
            self.tree
                .insert(Self::index_key(entry.log_id.index), bytes)
                .map_err(|err| StorageError::IO { source: openraft::StorageIOError::write_logs(&err) })?;
        }
        self.tree.flush_async().await.map_err(|err| StorageError::IO {
            source: openraft::StorageIOError::write_logs(&err),
        })?;
        callback.io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId<u64>) -> Result<(), StorageError<u64>> {
        let keys: Vec<Vec<u8>> = self
            .tree
            .range(Self::index_key(log_id.index)..)
            .filter_map(|item| item.ok())
            .map(|(key, _)| key.to_vec())
            .collect();
        for key in keys {
            self.tree.remove(key).map_err(|err| StorageError::IO {
                source: openraft::StorageIOError::write_logs(&err),
            })?;
        }
        Ok(())
    }

    async fn purge(&mut self, log_id: LogId<u64>) -> Result<(), StorageError<u64>> {
        let keys: Vec<Vec<u8>> = self
            .tree
            .range(..=Self::index_key(log_id.index))
            .filter_map(|item| item.ok())
            .map(|(key, _)| key.to_vec())
            .collect();
        for key in keys {
            self.tree.remove(key).map_err(|err| StorageError::IO {
                source: openraft::StorageIOError::write_logs(&err),
            })?;
        }
        Ok(())
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }
}
