//! `HSET/HSETNX/HGET/HDEL/HEXISTS/HGETALL/HKEYS/HVALS/HLEN/HSTRLEN/HINCRBY/HINCRBYFLOAT`.

use std::collections::HashMap;

use kv_common::{KvError, KvResult};
use kv_core::{Key, Value};

use super::common::{encode_bulk_array, parse_i64};
use super::HandlerEnv;
use crate::resp::{encode_bulk, encode_integer, encode_null_bulk};

pub async fn hset(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 4 || argv.len() % 2 != 0 {
        return Err(KvError::WrongArgs("hset".into()));
    }
    let key = Key::from(argv[1].clone());
    let pairs: Vec<(&[u8], &[u8])> =
        argv[2..].chunks_exact(2).map(|c| (c[0].as_slice(), c[1].as_slice())).collect();

    let (mut guard, _) =
        env.keyspace.create_key_and_lock(env.ctx, key.clone(), Value::Hash(HashMap::new())).await?;
    let hash = guard.value.as_hash_mut(&key.display())?;
    let mut added = 0i64;
    for (field, value) in pairs {
        if hash.insert(field.to_vec(), Value::String(value.to_vec())).is_none() {
            added += 1;
        }
    }
    Ok(encode_integer(added))
}

pub async fn hsetnx(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("hsetnx".into()));
    }
    let key = Key::from(argv[1].clone());
    let field = argv[2].clone();
    let value = argv[3].clone();

    let (mut guard, created) =
        env.keyspace.create_key_and_lock(env.ctx, key.clone(), Value::Hash(HashMap::new())).await?;
    let hash = guard.value.as_hash_mut(&key.display())?;
    if !created && hash.contains_key(&field) {
        return Ok(encode_integer(0));
    }
    hash.insert(field, Value::String(value));
    Ok(encode_integer(1))
}

pub async fn hget(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 3 {
        return Err(KvError::WrongArgs("hget".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let hash = guard.value.as_hash(&key.display())?;
            Ok(hash
                .get(&argv[2])
                .map(|v| encode_bulk(&v.as_display_bytes()))
                .unwrap_or_else(encode_null_bulk))
        }
        Err(KvError::NotFound(_)) => Ok(encode_null_bulk()),
        Err(err) => Err(err),
    }
}

pub async fn hdel(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 3 {
        return Err(KvError::WrongArgs("hdel".into()));
    }
    let key = Key::from(argv[1].clone());
    let mut guard = match env.keyspace.key_lock(env.ctx, &key).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => return Ok(encode_integer(0)),
        Err(err) => return Err(err),
    };
    let hash = guard.value.as_hash_mut(&key.display())?;
    let mut removed = 0i64;
    for field in &argv[2..] {
        if hash.remove(field).is_some() {
            removed += 1;
        }
    }
    let empty = hash.is_empty();
    drop(guard);
    if empty {
        env.keyspace.delete_key_by_name(&key);
    }
    Ok(encode_integer(removed))
}

pub async fn hexists(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 3 {
        return Err(KvError::WrongArgs("hexists".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let hash = guard.value.as_hash(&key.display())?;
            Ok(encode_integer(hash.contains_key(&argv[2]) as i64))
        }
        Err(KvError::NotFound(_)) => Ok(encode_integer(0)),
        Err(err) => Err(err),
    }
}

pub async fn hgetall(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("hgetall".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let hash = guard.value.as_hash(&key.display())?;
            let mut flat = Vec::with_capacity(hash.len() * 2);
            for (field, value) in hash {
                flat.push(field.clone());
                flat.push(value.as_display_bytes());
            }
            Ok(encode_bulk_array(flat))
        }
        Err(KvError::NotFound(_)) => Ok(encode_bulk_array(Vec::new())),
        Err(err) => Err(err),
    }
}

pub async fn hkeys(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("hkeys".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let hash = guard.value.as_hash(&key.display())?;
            Ok(encode_bulk_array(hash.keys().cloned()))
        }
        Err(KvError::NotFound(_)) => Ok(encode_bulk_array(Vec::new())),
        Err(err) => Err(err),
    }
}

pub async fn hvals(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("hvals".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let hash = guard.value.as_hash(&key.display())?;
            Ok(encode_bulk_array(hash.values().map(|v| v.as_display_bytes())))
        }
        Err(KvError::NotFound(_)) => Ok(encode_bulk_array(Vec::new())),
        Err(err) => Err(err),
    }
}

pub async fn hlen(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("hlen".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => Ok(encode_integer(guard.value.as_hash(&key.display())?.len() as i64)),
        Err(KvError::NotFound(_)) => Ok(encode_integer(0)),
        Err(err) => Err(err),
    }
}

pub async fn hstrlen(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 3 {
        return Err(KvError::WrongArgs("hstrlen".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let hash = guard.value.as_hash(&key.display())?;
            let len = hash.get(&argv[2]).map(|v| v.as_display_bytes().len()).unwrap_or(0);
            Ok(encode_integer(len as i64))
        }
        Err(KvError::NotFound(_)) => Ok(encode_integer(0)),
        Err(err) => Err(err),
    }
}

pub async fn hincrby(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("hincrby".into()));
    }
    let key = Key::from(argv[1].clone());
    let field_name = String::from_utf8_lossy(&argv[2]).into_owned();
    let delta = parse_i64(&argv[3], "hincrby")?;

    let (mut guard, _) =
        env.keyspace.create_key_and_lock(env.ctx, key.clone(), Value::Hash(HashMap::new())).await?;
    let hash = guard.value.as_hash_mut(&key.display())?;
    let current = hash.get(&argv[2]).map(|v| v.as_i64_strict(&field_name)).transpose()?.unwrap_or(0);
    let updated = current + delta;
    hash.insert(argv[2].clone(), Value::Integer(updated));
    Ok(encode_integer(updated))
}

pub async fn hincrbyfloat(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("hincrbyfloat".into()));
    }
    let key = Key::from(argv[1].clone());
    let field_name = String::from_utf8_lossy(&argv[2]).into_owned();
    let delta: f64 = std::str::from_utf8(&argv[3])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| KvError::NotAnInteger("hincrbyfloat".into()))?;

    let (mut guard, _) =
        env.keyspace.create_key_and_lock(env.ctx, key.clone(), Value::Hash(HashMap::new())).await?;
    let hash = guard.value.as_hash_mut(&key.display())?;
    let current = hash.get(&argv[2]).map(|v| v.as_f64(&field_name)).transpose()?.unwrap_or(0.0);
    let updated = current + delta;
    hash.insert(argv[2].clone(), Value::Float(updated));
    Ok(encode_bulk(Value::Float(updated).as_display_bytes().as_slice()))
}
