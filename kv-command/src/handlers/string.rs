//! `GET`, `SET`, `MGET`, `MSET`, `DEL`.

use kv_common::{KvError, KvResult};
use kv_core::{Key, Value};

use super::common::parse_expire_option;
use super::HandlerEnv;
use crate::resp::{encode_array, encode_bulk, encode_integer, encode_null_bulk, encode_simple};

pub async fn get(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("get".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            if guard.is_expired_at(std::time::Instant::now()) {
                return Ok(encode_null_bulk());
            }
            Ok(encode_bulk(&guard.value.as_display_bytes()))
        }
        Err(KvError::NotFound(_)) => Ok(encode_null_bulk()),
        Err(err) => Err(err),
    }
}

/// `SET key value [NX|XX] [GET] [EX s|PX ms|EXAT s|PXAT ms]`.
pub async fn set(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 3 {
        return Err(KvError::WrongArgs("set".into()));
    }
    let key = Key::from(argv[1].clone());
    let value = Value::adapt(&argv[2]);

    let mut nx = false;
    let mut xx = false;
    let mut want_get = false;
    let mut expire_at = None;

    let mut i = 3;
    while i < argv.len() {
        let opt = String::from_utf8_lossy(&argv[i]).to_ascii_uppercase();
        match opt.as_str() {
            "NX" => {
                nx = true;
                i += 1;
            }
            "XX" => {
                xx = true;
                i += 1;
            }
            "GET" => {
                want_get = true;
                i += 1;
            }
            "EX" | "PX" | "EXAT" | "PXAT" => {
                let raw = argv.get(i + 1).ok_or_else(|| KvError::WrongArgs("set".into()))?;
                expire_at = Some(parse_expire_option(&opt, raw)?);
                i += 2;
            }
            _ => return Err(KvError::WrongArgs("set".into())),
        }
    }

    // A single create-or-lock call instead of a racy `key_exists` check plus
    // a later branch: two concurrent SETs for the same absent key can no
    // longer both observe "absent" and step on each other.
    let (mut guard, created) =
        env.keyspace.create_key_and_lock(env.ctx, key, value.clone()).await?;
    let previous = (!created && want_get).then(|| guard.value.as_display_bytes());

    if nx && !created {
        drop(guard);
        return Ok(if want_get {
            previous.map(|v| encode_bulk(&v)).unwrap_or_else(encode_null_bulk)
        } else {
            encode_null_bulk()
        });
    }
    if xx && created {
        env.keyspace.delete_key(guard);
        return Ok(encode_null_bulk());
    }

    if !created {
        env.keyspace.set_value(&mut guard, value);
    }
    env.keyspace.set_expiry(&mut guard, expire_at, false);
    drop(guard);

    if want_get {
        Ok(previous.map(|v| encode_bulk(&v)).unwrap_or_else(encode_null_bulk))
    } else {
        Ok(encode_simple("OK"))
    }
}

pub async fn mget(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("mget".into()));
    }
    let mut replies = Vec::with_capacity(argv.len() - 1);
    for raw_key in &argv[1..] {
        let key = Key::from(raw_key.clone());
        let reply = match env.keyspace.key_rlock(env.ctx, &key).await {
            Ok(guard) if !guard.is_expired_at(std::time::Instant::now()) => {
                encode_bulk(&guard.value.as_display_bytes())
            }
            _ => encode_null_bulk(),
        };
        replies.push(reply);
    }
    Ok(encode_array(&replies))
}

pub async fn mset(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 3 || argv.len() % 2 != 1 {
        return Err(KvError::WrongArgs("mset".into()));
    }
    for pair in argv[1..].chunks_exact(2) {
        let key = Key::from(pair[0].clone());
        let value = Value::adapt(&pair[1]);
        let (mut guard, created) =
            env.keyspace.create_key_and_lock(env.ctx, key, value.clone()).await?;
        if !created {
            env.keyspace.set_value(&mut guard, value);
        }
    }
    Ok(encode_simple("OK"))
}

pub async fn del(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("del".into()));
    }
    let mut deleted = 0i64;
    for raw_key in &argv[1..] {
        let key = Key::from(raw_key.clone());
        if let Ok(guard) = env.keyspace.key_lock(env.ctx, &key).await {
            env.keyspace.delete_key(guard);
            deleted += 1;
        }
    }
    Ok(encode_integer(deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_acl::AclStore;
    use kv_engine::{Context, Keyspace, KeyspaceConfig};
    use kv_persist::SnapshotEngine;

    struct NullSink;

    #[async_trait::async_trait]
    impl SnapshotSink for NullSink {
        async fn write(&self, _bytes: &[u8]) -> KvResult<()> {
            Ok(())
        }
        async fn read(&self) -> KvResult<Vec<u8>> {
            Err(KvError::NotFound("snapshot".into()))
        }
        async fn cancel(&self) -> KvResult<()> {
            Ok(())
        }
    }

    fn env<'a>(
        keyspace: &'a Keyspace,
        ctx: &'a Context,
        acl: &'a AclStore,
        registry: &'a crate::registry::CommandRegistry,
        snapshot: &'a SnapshotEngine,
        sink: &'a NullSink,
    ) -> HandlerEnv<'a> {
        HandlerEnv {
            keyspace,
            ctx,
            acl,
            registry,
            aof: None,
            snapshot,
            snapshot_sink: sink,
            server_id: "test",
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let keyspace = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let acl = AclStore::new();
        let registry = crate::registry::CommandRegistry::new();
        let snapshot = SnapshotEngine::new();
        let sink = NullSink;
        let env = env(&keyspace, &ctx, &acl, &registry, &snapshot, &sink);

        let argv = vec![b"set".to_vec(), b"k".to_vec(), b"v".to_vec()];
        let reply = set(&env, &argv).await.unwrap();
        assert_eq!(reply, b"+OK\r\n".to_vec());

        let argv = vec![b"get".to_vec(), b"k".to_vec()];
        let reply = get(&env, &argv).await.unwrap();
        assert_eq!(reply, b"$1\r\nv\r\n".to_vec());
    }

    #[tokio::test]
    async fn get_missing_key_is_null_bulk() {
        let keyspace = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let acl = AclStore::new();
        let registry = crate::registry::CommandRegistry::new();
        let snapshot = SnapshotEngine::new();
        let sink = NullSink;
        let env = env(&keyspace, &ctx, &acl, &registry, &snapshot, &sink);

        let argv = vec![b"get".to_vec(), b"missing".to_vec()];
        let reply = get(&env, &argv).await.unwrap();
        assert_eq!(reply, b"$-1\r\n".to_vec());
    }

    #[tokio::test]
    async fn set_nx_refuses_existing_key() {
        let keyspace = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let acl = AclStore::new();
        let registry = crate::registry::CommandRegistry::new();
        let snapshot = SnapshotEngine::new();
        let sink = NullSink;
        let env = env(&keyspace, &ctx, &acl, &registry, &snapshot, &sink);

        set(&env, &[b"set".to_vec(), b"k".to_vec(), b"v1".to_vec()]).await.unwrap();
        let reply = set(
            &env,
            &[b"set".to_vec(), b"k".to_vec(), b"v2".to_vec(), b"NX".to_vec()],
        )
        .await
        .unwrap();
        assert_eq!(reply, b"$-1\r\n".to_vec());

        let get_reply = get(&env, &[b"get".to_vec(), b"k".to_vec()]).await.unwrap();
        assert_eq!(get_reply, b"$2\r\nv1\r\n".to_vec());
    }

    #[tokio::test]
    async fn del_counts_only_existing_keys() {
        let keyspace = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let acl = AclStore::new();
        let registry = crate::registry::CommandRegistry::new();
        let snapshot = SnapshotEngine::new();
        let sink = NullSink;
        let env = env(&keyspace, &ctx, &acl, &registry, &snapshot, &sink);

        set(&env, &[b"set".to_vec(), b"a".to_vec(), b"1".to_vec()]).await.unwrap();
        let reply = del(&env, &[b"del".to_vec(), b"a".to_vec(), b"b".to_vec()]).await.unwrap();
        assert_eq!(reply, b":1\r\n".to_vec());
    }
}
