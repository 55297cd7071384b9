//! `SADD/SCARD/SDIFF[STORE]/SINTER[STORE]/SISMEMBER/SMEMBERS/SMISMEMBER/SMOVE/SPOP/SRANDMEMBER/SREM/SUNION[STORE]`.
//!
//! `STORE` variants and `SINTERCARD` are left for a follow-up; the plain
//! read/write forms cover the representative surface.

use std::collections::HashSet;

use kv_common::{KvError, KvResult};
use kv_core::{Key, Value};
use rand::seq::IteratorRandom;

use super::common::{encode_bulk_array, parse_i64};
use super::HandlerEnv;
use crate::resp::{encode_integer, encode_null_bulk};

pub async fn sadd(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 3 {
        return Err(KvError::WrongArgs("sadd".into()));
    }
    let key = Key::from(argv[1].clone());
    let members = &argv[2..];

    let (mut guard, _) =
        env.keyspace.create_key_and_lock(env.ctx, key.clone(), Value::Set(HashSet::new())).await?;
    let set = guard.value.as_set_mut(&key.display())?;
    let added = members.iter().filter(|m| set.insert((*m).clone())).count();
    Ok(encode_integer(added as i64))
}

pub async fn scard(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("scard".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => Ok(encode_integer(guard.value.as_set(&key.display())?.len() as i64)),
        Err(KvError::NotFound(_)) => Ok(encode_integer(0)),
        Err(err) => Err(err),
    }
}

pub async fn sismember(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 3 {
        return Err(KvError::WrongArgs("sismember".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => Ok(encode_integer(guard.value.as_set(&key.display())?.contains(&argv[2]) as i64)),
        Err(KvError::NotFound(_)) => Ok(encode_integer(0)),
        Err(err) => Err(err),
    }
}

pub async fn smismember(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 3 {
        return Err(KvError::WrongArgs("smismember".into()));
    }
    let key = Key::from(argv[1].clone());
    let results: Vec<Vec<u8>> = match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let set = guard.value.as_set(&key.display())?;
            argv[2..]
                .iter()
                .map(|m| if set.contains(m) { b"1".to_vec() } else { b"0".to_vec() })
                .collect()
        }
        Err(KvError::NotFound(_)) => argv[2..].iter().map(|_| b"0".to_vec()).collect(),
        Err(err) => return Err(err),
    };
    Ok(encode_bulk_array(results))
}

pub async fn smembers(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("smembers".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => Ok(encode_bulk_array(guard.value.as_set(&key.display())?.iter().cloned())),
        Err(KvError::NotFound(_)) => Ok(encode_bulk_array(Vec::new())),
        Err(err) => Err(err),
    }
}

pub async fn srem(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 3 {
        return Err(KvError::WrongArgs("srem".into()));
    }
    let key = Key::from(argv[1].clone());
    let mut guard = match env.keyspace.key_lock(env.ctx, &key).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => return Ok(encode_integer(0)),
        Err(err) => return Err(err),
    };
    let set = guard.value.as_set_mut(&key.display())?;
    let removed = argv[2..].iter().filter(|m| set.remove(*m)).count();
    let empty = set.is_empty();
    drop(guard);
    if empty {
        env.keyspace.delete_key_by_name(&key);
    }
    Ok(encode_integer(removed as i64))
}

pub async fn spop(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("spop".into()));
    }
    let count = if argv.len() >= 3 { Some(parse_i64(&argv[2], "spop")?.max(0) as usize) } else { None };
    let key = Key::from(argv[1].clone());

    let mut guard = match env.keyspace.key_lock(env.ctx, &key).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => {
            return Ok(if count.is_some() { encode_bulk_array(Vec::new()) } else { encode_null_bulk() });
        }
        Err(err) => return Err(err),
    };
    let set = guard.value.as_set_mut(&key.display())?;
    let take = count.unwrap_or(1).min(set.len());
    let chosen: Vec<Vec<u8>> = {
        let mut rng = rand::thread_rng();
        set.iter().cloned().choose_multiple(&mut rng, take)
    };
    for member in &chosen {
        set.remove(member);
    }
    let empty = set.is_empty();
    drop(guard);
    if empty {
        env.keyspace.delete_key_by_name(&key);
    }

    if count.is_some() {
        Ok(encode_bulk_array(chosen))
    } else {
        Ok(chosen.into_iter().next().map(|m| crate::resp::encode_bulk(&m)).unwrap_or_else(encode_null_bulk))
    }
}

pub async fn srandmember(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("srandmember".into()));
    }
    let count = if argv.len() >= 3 { Some(parse_i64(&argv[2], "srandmember")?) } else { None };
    let key = Key::from(argv[1].clone());

    let guard = match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => {
            return Ok(if count.is_some() { encode_bulk_array(Vec::new()) } else { encode_null_bulk() });
        }
        Err(err) => return Err(err),
    };
    let set = guard.value.as_set(&key.display())?;
    let mut rng = rand::thread_rng();

    match count {
        None => Ok(set
            .iter()
            .cloned()
            .choose(&mut rng)
            .map(|m| crate::resp::encode_bulk(&m))
            .unwrap_or_else(encode_null_bulk)),
        Some(n) if n >= 0 => {
            let chosen = set.iter().cloned().choose_multiple(&mut rng, n as usize);
            Ok(encode_bulk_array(chosen))
        }
        Some(n) => {
            // Negative count: allowed to repeat members.
            let members: Vec<&Vec<u8>> = set.iter().collect();
            if members.is_empty() {
                return Ok(encode_bulk_array(Vec::new()));
            }
            let chosen: Vec<Vec<u8>> = (0..(-n) as usize)
                .filter_map(|_| members.iter().choose(&mut rng).map(|m| (**m).clone()))
                .collect();
            Ok(encode_bulk_array(chosen))
        }
    }
}

pub async fn smove(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("smove".into()));
    }
    let source = Key::from(argv[1].clone());
    let dest = Key::from(argv[2].clone());
    let member = argv[3].clone();

    let mut src_guard = match env.keyspace.key_lock(env.ctx, &source).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => return Ok(encode_integer(0)),
        Err(err) => return Err(err),
    };
    let src_set = src_guard.value.as_set_mut(&source.display())?;
    if !src_set.remove(&member) {
        return Ok(encode_integer(0));
    }
    let src_empty = src_set.is_empty();
    drop(src_guard);
    if src_empty {
        env.keyspace.delete_key_by_name(&source);
    }

    let (mut dest_guard, _) =
        env.keyspace.create_key_and_lock(env.ctx, dest.clone(), Value::Set(HashSet::new())).await?;
    dest_guard.value.as_set_mut(&dest.display())?.insert(member);
    Ok(encode_integer(1))
}

async fn load_set(env: &HandlerEnv<'_>, raw_key: &[u8]) -> KvResult<HashSet<Vec<u8>>> {
    let key = Key::from(raw_key.to_vec());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => Ok(guard.value.as_set(&key.display())?.clone()),
        Err(KvError::NotFound(_)) => Ok(HashSet::new()),
        Err(err) => Err(err),
    }
}

pub async fn sunion(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("sunion".into()));
    }
    let mut result = HashSet::new();
    for raw_key in &argv[1..] {
        result.extend(load_set(env, raw_key).await?);
    }
    Ok(encode_bulk_array(result))
}

pub async fn sinter(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("sinter".into()));
    }
    let mut sets = Vec::with_capacity(argv.len() - 1);
    for raw_key in &argv[1..] {
        sets.push(load_set(env, raw_key).await?);
    }
    let mut result = sets.first().cloned().unwrap_or_default();
    for set in &sets[1..] {
        result.retain(|m| set.contains(m));
    }
    Ok(encode_bulk_array(result))
}

pub async fn sdiff(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs("sdiff".into()));
    }
    let mut result = load_set(env, &argv[1]).await?;
    for raw_key in &argv[2..] {
        let other = load_set(env, raw_key).await?;
        result.retain(|m| !other.contains(m));
    }
    Ok(encode_bulk_array(result))
}
