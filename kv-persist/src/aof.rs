//! # Append-only file engine
//!
//! Standalone-mode durability (§4.6). A single background task owns the
//! append file and drains a channel of raw write-command frames, so callers
//! never block on disk I/O themselves. Frames are length-prefixed (`u32`
//! little-endian length, then that many bytes of RESP-encoded command) so
//! the replay path can split the log back into frames without scanning for
//! a delimiter that could collide with binary payload bytes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kv_common::{KvError, KvResult};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// When the writer task calls `fsync` after an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// fsync after every single append.
    Always,
    /// fsync at most once per second, driven by a dedicated timer.
    EverySec,
    /// Never fsync explicitly; leave durability to the OS.
    No,
}

#[derive(Debug, Clone)]
pub struct AofConfig {
    pub append_path: PathBuf,
    pub preamble_path: PathBuf,
    pub fsync: FsyncPolicy,
}

enum AofOp {
    Append(Vec<u8>),
    Fsync,
    /// §4.6 rewrite: write `preamble` to the sidecar file, truncate the
    /// append log, then resume. Queued through the same channel as
    /// `Append` so ordering with in-flight appends is automatic and no
    /// separate mutex is needed around the append path.
    Rewrite { preamble: Vec<u8>, done: oneshot::Sender<KvResult<()>> },
}

/// Handle used by command dispatch to enqueue writes and trigger rewrites.
#[derive(Clone)]
pub struct AofHandle {
    sender: mpsc::UnboundedSender<AofOp>,
}

impl AofHandle {
    /// Enqueues a raw write-command frame for durable append. Returns
    /// immediately; the write happens on the background task.
    pub fn append(&self, frame: Vec<u8>) -> KvResult<()> {
        self.sender
            .send(AofOp::Append(frame))
            .map_err(|_| KvError::Internal("aof writer task has shut down".into()))
    }

    /// Drives a full rewrite cycle and waits for it to complete.
    pub async fn rewrite(&self, preamble: Vec<u8>) -> KvResult<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AofOp::Rewrite { preamble, done: tx })
            .map_err(|_| KvError::Internal("aof writer task has shut down".into()))?;
        rx.await.map_err(|_| KvError::Internal("aof writer task dropped rewrite response".into()))?
    }
}

/// Spawns the background writer task and returns a handle plus its join
/// handle (join on shutdown to guarantee the final flush landed).
pub fn spawn_aof_writer(config: AofConfig) -> (AofHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = AofHandle { sender: tx.clone() };
    let join = tokio::spawn(run_writer(config, rx, tx));
    (handle, join)
}

async fn run_writer(
    config: AofConfig,
    mut rx: mpsc::UnboundedReceiver<AofOp>,
    self_tx: mpsc::UnboundedSender<AofOp>,
) {
    let mut file = match open_append(&config.append_path).await {
        Ok(f) => f,
        Err(err) => {
            warn!(error = %err, "aof writer failed to open append file, exiting");
            return;
        }
    };

    if config.fsync == FsyncPolicy::EverySec {
        let tick_tx = self_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                if tick_tx.send(AofOp::Fsync).is_err() {
                    return;
                }
            }
        });
    }

    while let Some(op) = rx.recv().await {
        match op {
            AofOp::Append(frame) => {
                if let Err(err) = write_frame(&mut file, &frame).await {
                    warn!(error = %err, "aof append failed");
                    continue;
                }
                if config.fsync == FsyncPolicy::Always {
                    let _ = file.sync_data().await;
                }
            }
            AofOp::Fsync => {
                let _ = file.sync_data().await;
            }
            AofOp::Rewrite { preamble, done } => {
                let result = do_rewrite(&config, &mut file, &preamble).await;
                let _ = done.send(result);
            }
        }
    }
    debug!("aof writer task draining on channel close");
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn write_frame(file: &mut File, frame: &[u8]) -> std::io::Result<()> {
    let len = (frame.len() as u32).to_le_bytes();
    file.write_all(&len).await?;
    file.write_all(frame).await?;
    Ok(())
}

async fn do_rewrite(config: &AofConfig, file: &mut File, preamble: &[u8]) -> KvResult<()> {
    tokio::fs::write(&config.preamble_path, preamble).await?;
    let fresh = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&config.append_path)
        .await?;
    *file = fresh;
    debug!(path = %config.append_path.display(), "aof rewrite truncated append log");
    Ok(())
}

/// Boot-time restore helpers (§4.6). Read separately from the writer task
/// since restore runs once, before the writer and dispatch pipeline exist.
pub struct AofReader;

impl AofReader {
    /// Returns the preamble's raw bytes if a sidecar snapshot file exists.
    pub async fn read_preamble(config: &AofConfig) -> KvResult<Option<Vec<u8>>> {
        match tokio::fs::read(&config.preamble_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(KvError::IoFailure(err)),
        }
    }

    /// Replays every frame in the append log in order, calling `replay` for
    /// each. Intended to run with `replay=true` dispatch so handlers don't
    /// re-enqueue what's already in the log.
    pub async fn replay_append_log<F>(config: &AofConfig, mut replay: F) -> KvResult<usize>
    where
        F: FnMut(Vec<u8>) -> KvResult<()>,
    {
        let mut file = match File::open(&config.append_path).await {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(KvError::IoFailure(err)),
        };

        let mut count = 0usize;
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(KvError::IoFailure(err)),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut frame = vec![0u8; len];
            file.read_exact(&mut frame).await.map_err(KvError::IoFailure)?;
            replay(frame)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> AofConfig {
        AofConfig {
            append_path: dir.join("appendonly.aof"),
            preamble_path: dir.join("appendonly.preamble"),
            fsync: FsyncPolicy::Always,
        }
    }

    #[tokio::test]
    async fn append_then_replay_round_trips_frames() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let (handle, join) = spawn_aof_writer(config.clone());

        handle.append(b"SET a 1".to_vec()).unwrap();
        handle.append(b"SET b 2".to_vec()).unwrap();
        drop(handle);
        join.await.unwrap();

        let replayed = Arc::new(Mutex::new(Vec::new()));
        let replayed_clone = replayed.clone();
        let count = AofReader::replay_append_log(&config, move |frame| {
            replayed_clone.lock().unwrap().push(frame);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(replayed.lock().unwrap()[0], b"SET a 1");
        assert_eq!(replayed.lock().unwrap()[1], b"SET b 2");
    }

    #[tokio::test]
    async fn rewrite_writes_preamble_and_truncates_log() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let (handle, join) = spawn_aof_writer(config.clone());

        handle.append(b"SET a 1".to_vec()).unwrap();
        handle.rewrite(b"preamble-bytes".to_vec()).await.unwrap();
        handle.append(b"SET b 2".to_vec()).unwrap();
        drop(handle);
        join.await.unwrap();

        let preamble = AofReader::read_preamble(&config).await.unwrap();
        assert_eq!(preamble, Some(b"preamble-bytes".to_vec()));

        let replayed = Arc::new(Mutex::new(Vec::new()));
        let replayed_clone = replayed.clone();
        let count = AofReader::replay_append_log(&config, move |frame| {
            replayed_clone.lock().unwrap().push(frame);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(replayed.lock().unwrap()[0], b"SET b 2");
    }

    #[tokio::test]
    async fn missing_log_replays_as_empty() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let count = AofReader::replay_append_log(&config, |_| Ok(())).await.unwrap();
        assert_eq!(count, 0);
    }
}
