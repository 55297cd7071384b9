//! # kv-persist
//!
//! Standalone-mode durability: the append-only file engine (§4.6) and the
//! snapshot engine (§4.7) shared by `SAVE` and the Raft FSM.

pub mod aof;
pub mod snapshot;

pub use aof::{AofConfig, AofHandle, AofReader, FsyncPolicy};
pub use snapshot::{FileSink, SnapshotEngine, SnapshotPayload, SnapshotSink};
