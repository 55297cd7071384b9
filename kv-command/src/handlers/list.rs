//! `LPUSH/RPUSH/LPOP/RPOP/LLEN/LRANGE/LINDEX/LSET/LTRIM/LREM/LMOVE`.

use kv_common::{KvError, KvResult};
use kv_core::{Key, Value};

use super::common::{encode_bulk_array, normalize_range, parse_i64};
use super::HandlerEnv;
use crate::resp::{encode_bulk, encode_integer, encode_null_bulk, encode_simple};

async fn push(env: &HandlerEnv<'_>, argv: &[Vec<u8>], front: bool, name: &str) -> KvResult<Vec<u8>> {
    if argv.len() < 3 {
        return Err(KvError::WrongArgs(name.into()));
    }
    let key = Key::from(argv[1].clone());
    let items: Vec<Value> = argv[2..].iter().map(|b| Value::String(b.clone())).collect();

    let (mut guard, _) =
        env.keyspace.create_key_and_lock(env.ctx, key.clone(), Value::List(Vec::new())).await?;
    let list = guard.value.as_list_mut(&key.display())?;
    if front {
        for item in items {
            list.insert(0, item);
        }
    } else {
        list.extend(items);
    }
    let len = list.len();
    Ok(encode_integer(len as i64))
}

pub async fn lpush(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    push(env, argv, true, "lpush").await
}

pub async fn rpush(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    push(env, argv, false, "rpush").await
}

async fn pop(env: &HandlerEnv<'_>, argv: &[Vec<u8>], front: bool, name: &str) -> KvResult<Vec<u8>> {
    if argv.len() < 2 {
        return Err(KvError::WrongArgs(name.into()));
    }
    let count = if argv.len() >= 3 { Some(parse_i64(&argv[2], name)?.max(0) as usize) } else { None };
    let key = Key::from(argv[1].clone());

    let mut guard = match env.keyspace.key_lock(env.ctx, &key).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => return Ok(encode_null_bulk()),
        Err(err) => return Err(err),
    };
    let list = guard.value.as_list_mut(&key.display())?;
    let take = count.unwrap_or(1).min(list.len());
    let mut popped = Vec::with_capacity(take);
    for _ in 0..take {
        if list.is_empty() {
            break;
        }
        let item = if front { list.remove(0) } else { list.pop().unwrap() };
        popped.push(item.as_display_bytes());
    }
    let empty = list.is_empty();
    drop(guard);
    if empty {
        env.keyspace.delete_key_by_name(&key);
    }

    if count.is_some() {
        Ok(encode_bulk_array(popped))
    } else {
        Ok(popped.into_iter().next().map(|b| encode_bulk(&b)).unwrap_or_else(encode_null_bulk))
    }
}

pub async fn lpop(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    pop(env, argv, true, "lpop").await
}

pub async fn rpop(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    pop(env, argv, false, "rpop").await
}

pub async fn llen(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 2 {
        return Err(KvError::WrongArgs("llen".into()));
    }
    let key = Key::from(argv[1].clone());
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => Ok(encode_integer(guard.value.as_list(&key.display())?.len() as i64)),
        Err(KvError::NotFound(_)) => Ok(encode_integer(0)),
        Err(err) => Err(err),
    }
}

pub async fn lrange(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("lrange".into()));
    }
    let key = Key::from(argv[1].clone());
    let start = parse_i64(&argv[2], "lrange")?;
    let stop = parse_i64(&argv[3], "lrange")?;
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let list = guard.value.as_list(&key.display())?;
            let items = match normalize_range(start, stop, list.len()) {
                Some((lo, hi)) => list[lo..hi].iter().map(|v| v.as_display_bytes()).collect(),
                None => Vec::new(),
            };
            Ok(encode_bulk_array(items))
        }
        Err(KvError::NotFound(_)) => Ok(encode_bulk_array(Vec::new())),
        Err(err) => Err(err),
    }
}

pub async fn lindex(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 3 {
        return Err(KvError::WrongArgs("lindex".into()));
    }
    let key = Key::from(argv[1].clone());
    let index = parse_i64(&argv[2], "lindex")?;
    match env.keyspace.key_rlock(env.ctx, &key).await {
        Ok(guard) => {
            let list = guard.value.as_list(&key.display())?;
            let resolved = if index < 0 { list.len() as i64 + index } else { index };
            if resolved < 0 || resolved as usize >= list.len() {
                return Ok(encode_null_bulk());
            }
            Ok(encode_bulk(&list[resolved as usize].as_display_bytes()))
        }
        Err(KvError::NotFound(_)) => Ok(encode_null_bulk()),
        Err(err) => Err(err),
    }
}

pub async fn lset(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("lset".into()));
    }
    let key = Key::from(argv[1].clone());
    let index = parse_i64(&argv[2], "lset")?;
    let mut guard = env.keyspace.key_lock(env.ctx, &key).await?;
    let list = guard.value.as_list_mut(&key.display())?;
    let resolved = if index < 0 { list.len() as i64 + index } else { index };
    if resolved < 0 || resolved as usize >= list.len() {
        return Err(KvError::Internal("index out of range".into()));
    }
    list[resolved as usize] = Value::String(argv[3].clone());
    Ok(encode_simple("OK"))
}

pub async fn ltrim(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("ltrim".into()));
    }
    let key = Key::from(argv[1].clone());
    let start = parse_i64(&argv[2], "ltrim")?;
    let stop = parse_i64(&argv[3], "ltrim")?;
    let mut guard = match env.keyspace.key_lock(env.ctx, &key).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => return Ok(encode_simple("OK")),
        Err(err) => return Err(err),
    };
    let list = guard.value.as_list_mut(&key.display())?;
    let retained = match normalize_range(start, stop, list.len()) {
        Some((lo, hi)) => list[lo..hi].to_vec(),
        None => Vec::new(),
    };
    *list = retained;
    let empty = list.is_empty();
    drop(guard);
    if empty {
        env.keyspace.delete_key_by_name(&key);
    }
    Ok(encode_simple("OK"))
}

pub async fn lrem(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 4 {
        return Err(KvError::WrongArgs("lrem".into()));
    }
    let key = Key::from(argv[1].clone());
    let count = parse_i64(&argv[2], "lrem")?;
    let target = &argv[3];

    let mut guard = match env.keyspace.key_lock(env.ctx, &key).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => return Ok(encode_integer(0)),
        Err(err) => return Err(err),
    };
    let list = guard.value.as_list_mut(&key.display())?;
    let matches = |v: &Value| v.as_display_bytes() == *target;

    let mut removed = 0i64;
    if count == 0 {
        let before = list.len();
        list.retain(|v| !matches(v));
        removed = (before - list.len()) as i64;
    } else if count > 0 {
        let mut remaining = count;
        list.retain(|v| {
            if remaining > 0 && matches(v) {
                remaining -= 1;
                removed += 1;
                false
            } else {
                true
            }
        });
    } else {
        let mut remaining = -count;
        let mut kept = Vec::with_capacity(list.len());
        for item in list.drain(..).rev() {
            if remaining > 0 && matches(&item) {
                remaining -= 1;
                removed += 1;
            } else {
                kept.push(item);
            }
        }
        kept.reverse();
        *list = kept;
    }
    let empty = list.is_empty();
    drop(guard);
    if empty {
        env.keyspace.delete_key_by_name(&key);
    }
    Ok(encode_integer(removed))
}

/// `LMOVE source destination LEFT|RIGHT LEFT|RIGHT`.
pub async fn lmove(env: &HandlerEnv<'_>, argv: &[Vec<u8>]) -> KvResult<Vec<u8>> {
    if argv.len() != 5 {
        return Err(KvError::WrongArgs("lmove".into()));
    }
    let source = Key::from(argv[1].clone());
    let dest = Key::from(argv[2].clone());
    let from_left = argv[3].eq_ignore_ascii_case(b"LEFT");
    let to_left = argv[4].eq_ignore_ascii_case(b"LEFT");

    let mut src_guard = match env.keyspace.key_lock(env.ctx, &source).await {
        Ok(g) => g,
        Err(KvError::NotFound(_)) => return Ok(encode_null_bulk()),
        Err(err) => return Err(err),
    };
    let src_list = src_guard.value.as_list_mut(&source.display())?;
    if src_list.is_empty() {
        return Ok(encode_null_bulk());
    }
    let item = if from_left { src_list.remove(0) } else { src_list.pop().unwrap() };
    let src_empty = src_list.is_empty();
    drop(src_guard);
    if src_empty {
        env.keyspace.delete_key_by_name(&source);
    }

    let reply = encode_bulk(&item.as_display_bytes());
    let (mut dest_guard, created) =
        env.keyspace.create_key_and_lock(env.ctx, dest.clone(), Value::List(Vec::new())).await?;
    if created {
        let dest_list = dest_guard.value.as_list_mut(&dest.display())?;
        dest_list.push(item);
    } else {
        let dest_list = dest_guard.value.as_list_mut(&dest.display())?;
        if to_left {
            dest_list.insert(0, item);
        } else {
            dest_list.push(item);
        }
    }
    Ok(reply)
}
