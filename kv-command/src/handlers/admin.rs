//! Admin commands: `SAVE`, `LASTSAVE`, `REWRITEAOF`, `COMMANDS`, `DBSIZE`,
//! `FLUSHALL`, `CLUSTER INFO`/`CLUSTER MYID`.

use kv_common::{KvError, KvResult};

use super::common::encode_bulk_array;
use super::HandlerEnv;
use crate::resp::{encode_bulk, encode_integer, encode_simple};

pub async fn save(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 1 {
        return Err(KvError::WrongArgs("save".into()));
    }
    env.snapshot.persist(env.keyspace, env.snapshot_sink).await?;
    Ok(encode_simple("OK"))
}

pub async fn lastsave(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 1 {
        return Err(KvError::WrongArgs("lastsave".into()));
    }
    Ok(encode_integer(env.snapshot.latest_snapshot_ms() / 1000))
}

/// Rewrites the AOF: persists a fresh snapshot preamble and truncates the
/// append log, per §4.6 and §4.7 working together.
pub async fn rewriteaof(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 1 {
        return Err(KvError::WrongArgs("rewriteaof".into()));
    }
    let aof = env.aof.ok_or_else(|| KvError::Internal("aof is not enabled".into()))?;
    let now = std::time::Instant::now();
    let entries = env.keyspace.get_state(now).await;
    let payload = kv_persist::SnapshotPayload {
        state: entries
            .into_iter()
            .map(|(key, data)| kv_persist::SnapshotEntry {
                key: key.into_vec(),
                value: (&data.value).into(),
                expire_at_unix_ms: data.expire_at.map(|_| 0),
            })
            .collect(),
        latest_snapshot_ms: 0,
    };
    let preamble = serde_json::to_vec(&payload)
        .map_err(|err| KvError::Internal(format!("aof rewrite encode failed: {err}")))?;
    aof.rewrite(preamble).await?;
    Ok(encode_simple("OK"))
}

pub async fn commands_catalog(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 1 {
        return Err(KvError::WrongArgs("commands".into()));
    }
    let names: Vec<Vec<u8>> = env.registry.catalog().into_iter().map(|n| n.as_bytes().to_vec()).collect();
    Ok(encode_bulk_array(names))
}

pub async fn dbsize(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 1 {
        return Err(KvError::WrongArgs("dbsize".into()));
    }
    Ok(encode_integer(env.keyspace.key_count() as i64))
}

pub async fn flushall(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 1 {
        return Err(KvError::WrongArgs("flushall".into()));
    }
    let now = std::time::Instant::now();
    let keys: Vec<kv_core::Key> = env.keyspace.get_state(now).await.into_iter().map(|(k, _)| k).collect();
    for key in &keys {
        env.keyspace.delete_key_by_name(key);
    }
    Ok(encode_simple("OK"))
}

/// `CLUSTER INFO` and `CLUSTER MYID`. Full cluster state lives in the
/// cluster layer; this reports only what a single connection-handling node
/// knows about itself.
pub async fn cluster_info(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("cluster".into()));
    }
    let sub = String::from_utf8_lossy(&argv[1]).to_ascii_uppercase();
    match sub.as_str() {
        "MYID" => Ok(encode_bulk(env.server_id.as_bytes())),
        "INFO" => {
            let info = format!("cluster_enabled:0\r\nserver_id:{}\r\n", env.server_id);
            Ok(encode_bulk(info.as_bytes()))
        }
        _ => Err(KvError::UnknownCommand(format!("cluster {sub}"))),
    }
}
