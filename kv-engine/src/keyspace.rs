//! # Keyspace
//!
//! The sharded, per-key-locked store (§4.1). Keys are distributed across a
//! fixed number of shards by hash; each shard owns its own lock map so
//! unrelated keys never contend on shard bookkeeping. Every resident key
//! gets its own `tokio::sync::RwLock`, created lazily on first write and
//! torn down when the key is deleted, per the design note in §9.

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use kv_common::{KvError, KvResult};
use kv_core::{Key, KeyData, Value};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, trace};

use crate::context::Context;
use crate::eviction::{EvictionKind, EvictionTracker};

const DEFAULT_SHARD_COUNT: usize = 16;

/// A single resident key's data, behind its own lock. Held by the shard map
/// as `Arc<RwLock<KeyData>>` so guards can be `'static`-owning via tokio's
/// `*_owned` lock methods without any unsafe code.
type Slot = RwLock<KeyData>;

struct Shard {
    slots: parking_lot::RwLock<hashbrown::HashMap<Key, Arc<Slot>>>,
    eviction: parking_lot::Mutex<EvictionTracker>,
}

impl Shard {
    fn new(eviction_kind: EvictionKind) -> Self {
        Shard {
            slots: parking_lot::RwLock::new(hashbrown::HashMap::new()),
            eviction: parking_lot::Mutex::new(EvictionTracker::new(eviction_kind)),
        }
    }
}

/// Engine-wide configuration relevant to the keyspace.
#[derive(Debug, Clone)]
pub struct KeyspaceConfig {
    pub max_keys: Option<usize>,
    pub eviction: EvictionKind,
    pub expiry_sweep_interval: Duration,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        KeyspaceConfig {
            max_keys: None,
            eviction: EvictionKind::NoEviction,
            expiry_sweep_interval: Duration::from_millis(100),
        }
    }
}

/// The sharded keyspace. Cheap to clone; all shards live behind `Arc`.
#[derive(Clone)]
pub struct Keyspace {
    shards: Arc<Vec<Shard>>,
    hasher: RandomState,
    config: KeyspaceConfig,
    key_count: Arc<AtomicU64>,
}

/// A held write lock on a key's data. Owns its `Arc<RwLock<KeyData>>` via
/// tokio's owned guard, so it carries no borrow from the keyspace.
pub struct KeyWriteGuard {
    key: Key,
    guard: OwnedRwLockWriteGuard<KeyData>,
}

impl std::ops::Deref for KeyWriteGuard {
    type Target = KeyData;
    fn deref(&self) -> &KeyData {
        &self.guard
    }
}

impl std::ops::DerefMut for KeyWriteGuard {
    fn deref_mut(&mut self) -> &mut KeyData {
        &mut self.guard
    }
}

impl KeyWriteGuard {
    pub fn key(&self) -> &Key {
        &self.key
    }
}

/// A held read lock on a key's data.
pub struct KeyReadGuard {
    key: Key,
    guard: OwnedRwLockReadGuard<KeyData>,
}

impl std::ops::Deref for KeyReadGuard {
    type Target = KeyData;
    fn deref(&self) -> &KeyData {
        &self.guard
    }
}

impl KeyReadGuard {
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Keyspace {
    pub fn new(config: KeyspaceConfig) -> Self {
        let shards = (0..DEFAULT_SHARD_COUNT)
            .map(|_| Shard::new(config.eviction))
            .collect();
        Keyspace {
            shards: Arc::new(shards),
            hasher: RandomState::new(),
            config,
            key_count: Arc::new(AtomicU64::new(0)),
        }
    }

    fn shard_for(&self, key: &Key) -> &Shard {
        let mut hasher = self.hasher.build_hasher();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub fn key_count(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// §4.1 `KeyExists`. Does not take a lock on the key beyond the shard's
    /// map lock, so callers relying on the result must re-check after
    /// acquiring any further lock.
    pub fn key_exists(&self, key: &Key) -> bool {
        self.shard_for(key).slots.read().contains_key(key)
    }

    /// §4.1 `CreateKeyAndLock`: atomically creates the key if absent, or
    /// locks the existing key if already present, returning the held write
    /// guard plus whether this call created it. Two concurrent callers that
    /// both want "create if absent, else mutate" never race each other into
    /// a spurious failure — at most one observes `created = true`, and the
    /// other simply locks what the winner created.
    pub async fn create_key_and_lock(
        &self,
        ctx: &Context,
        key: Key,
        value: Value,
    ) -> KvResult<(KeyWriteGuard, bool)> {
        if ctx.is_cancelled() {
            return Err(KvError::Cancelled);
        }
        let shard = self.shard_for(&key);
        let (slot, created) = {
            let mut slots = shard.slots.write();
            match slots.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let slot = Arc::new(RwLock::new(KeyData::new(value)));
                    slots.insert(key.clone(), slot.clone());
                    (slot, true)
                }
            }
        };

        if !created {
            let guard = tokio::select! {
                guard = slot.clone().write_owned() => guard,
                _ = ctx.cancelled() => return Err(KvError::Cancelled),
            };
            return Ok((KeyWriteGuard { key, guard }, false));
        }

        self.key_count.fetch_add(1, Ordering::Relaxed);
        shard.eviction.lock().on_insert(&key, false, None);
        self.maybe_evict(shard, ctx).await?;

        let guard = slot
            .try_write_owned()
            .expect("freshly created slot is uncontended");
        Ok((KeyWriteGuard { key, guard }, true))
    }

    /// §4.1 `KeyLock`: blocks (honoring cancellation) until the existing
    /// key's write lock is acquired.
    pub async fn key_lock(&self, ctx: &Context, key: &Key) -> KvResult<KeyWriteGuard> {
        let slot = self.lookup_slot(key)?;
        let guard = tokio::select! {
            guard = slot.clone().write_owned() => guard,
            _ = ctx.cancelled() => return Err(KvError::Cancelled),
        };
        Ok(KeyWriteGuard { key: key.clone(), guard })
    }

    /// §4.1 `KeyRLock`: blocks (honoring cancellation) until a read lock is
    /// acquired.
    pub async fn key_rlock(&self, ctx: &Context, key: &Key) -> KvResult<KeyReadGuard> {
        let slot = self.lookup_slot(key)?;
        let guard = tokio::select! {
            guard = slot.clone().read_owned() => guard,
            _ = ctx.cancelled() => return Err(KvError::Cancelled),
        };
        Ok(KeyReadGuard { key: key.clone(), guard })
    }

    fn lookup_slot(&self, key: &Key) -> KvResult<Arc<Slot>> {
        self.shard_for(key)
            .slots
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| KvError::NotFound(key.display()))
    }

    /// §4.1 `SetValue`: writes into an already-locked key's slot and records
    /// the access with the eviction tracker.
    pub fn set_value(&self, guard: &mut KeyWriteGuard, value: Value) {
        guard.guard.value = value;
        let shard = self.shard_for(&guard.key);
        let is_volatile = guard.guard.is_volatile();
        shard.eviction.lock().on_access(&guard.key, is_volatile);
    }

    /// §4.1 `SetExpiry`. When `only_if_smaller` is set, a new deadline is
    /// only applied if it's earlier than the current one (or none is set).
    pub fn set_expiry(
        &self,
        guard: &mut KeyWriteGuard,
        expire_at: Option<Instant>,
        only_if_smaller: bool,
    ) {
        if only_if_smaller {
            if let (Some(existing), Some(candidate)) = (guard.guard.expire_at, expire_at) {
                if candidate >= existing {
                    return;
                }
            }
        }
        guard.guard.expire_at = expire_at;
        let shard = self.shard_for(&guard.key);
        let is_volatile = guard.guard.is_volatile();
        shard.eviction.lock().on_insert(&guard.key, is_volatile, expire_at);
    }

    pub fn get_expiry(&self, guard: &KeyReadGuard) -> Option<Instant> {
        guard.guard.expire_at
    }

    /// §4.1 `DeleteKey`: removes the key from the shard map, tearing down
    /// its lock, and drops it from the eviction tracker. Consumes the write
    /// guard since the underlying slot no longer exists once removed.
    pub fn delete_key(&self, guard: KeyWriteGuard) {
        let shard = self.shard_for(&guard.key);
        shard.slots.write().remove(&guard.key);
        shard.eviction.lock().on_delete(&guard.key);
        self.key_count.fetch_sub(1, Ordering::Relaxed);
        drop(guard);
    }

    /// Deletes a key by name without requiring the caller to already hold a
    /// lock; used by the expiry sweeper and by `FLUSHALL`.
    pub fn delete_key_by_name(&self, key: &Key) -> bool {
        let shard = self.shard_for(key);
        let removed = shard.slots.write().remove(key).is_some();
        if removed {
            shard.eviction.lock().on_delete(key);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// §4.1 `GetState`: a read-only snapshot of every non-expired key,
    /// cloning values out from behind their individual locks. Intended for
    /// use under the state-copy barrier so writers don't race the copy.
    pub async fn get_state(&self, now: Instant) -> Vec<(Key, KeyData)> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            let snapshot: Vec<(Key, Arc<Slot>)> = shard
                .slots
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, slot) in snapshot {
                let data = slot.read().await;
                if !data.is_expired_at(now) {
                    out.push((key, KeyData { value: data.value.clone(), expire_at: data.expire_at }));
                }
            }
        }
        out
    }

    /// Sweeps every shard for expired keys and removes them. Run
    /// periodically by the background expiry task (§4.1).
    pub async fn sweep_expired(&self, now: Instant) -> usize {
        let mut expired_keys = Vec::new();
        for shard in self.shards.iter() {
            let candidates: Vec<(Key, Arc<Slot>)> = shard
                .slots
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, slot) in candidates {
                let is_expired = slot.read().await.is_expired_at(now);
                if is_expired {
                    expired_keys.push(key);
                }
            }
        }
        let count = expired_keys.len();
        for key in &expired_keys {
            self.delete_key_by_name(key);
        }
        if count > 0 {
            debug!(count, "expiry sweep removed keys");
        }
        count
    }

    async fn maybe_evict(&self, shard: &Shard, ctx: &Context) -> KvResult<()> {
        let Some(max_keys) = self.config.max_keys else { return Ok(()) };
        if (self.key_count() as usize) <= max_keys {
            return Ok(());
        }
        let mut held = hashbrown::HashSet::new();
        loop {
            if (self.key_count() as usize) <= max_keys {
                return Ok(());
            }
            if ctx.is_cancelled() {
                return Err(KvError::Cancelled);
            }
            let victim = shard.eviction.lock().select_victim_excluding(&held);
            let Some(victim) = victim else {
                // Policy has nothing eligible to evict (e.g. noeviction, or
                // volatile-* with no volatile keys); stop trying.
                return Ok(());
            };
            let Some(slot) = shard.slots.read().get(&victim).cloned() else {
                shard.eviction.lock().on_delete(&victim);
                continue;
            };
            // A slot currently locked elsewhere is skipped rather than
            // awaited on, so eviction never blocks behind a caller's own
            // in-flight write to the very key it is trying to evict.
            let Ok(_guard) = slot.try_write() else {
                held.insert(victim);
                continue;
            };
            shard.slots.write().remove(&victim);
            shard.eviction.lock().on_delete(&victim);
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            trace!(key = %victim.display(), "evicted key over capacity");
        }
    }

    /// Spawns the background expiry sweeper as a tokio task bound to
    /// `ctx`'s cancellation.
    pub fn spawn_expiry_sweeper(&self, ctx: Context) -> tokio::task::JoinHandle<()> {
        let keyspace = self.clone();
        let interval = self.config.expiry_sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        keyspace.sweep_expired(Instant::now()).await;
                    }
                    _ = ctx.cancelled() => {
                        debug!("expiry sweeper shutting down");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(n: &str) -> Key {
        Key::from(n)
    }

    #[tokio::test]
    async fn create_key_and_lock_locks_existing_instead_of_erroring() {
        let ks = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let (guard, created) =
            ks.create_key_and_lock(&ctx, kv("a"), Value::Integer(1)).await.unwrap();
        assert!(created);
        assert_eq!(guard.value, Value::Integer(1));
        drop(guard);

        let (guard, created) =
            ks.create_key_and_lock(&ctx, kv("a"), Value::Integer(2)).await.unwrap();
        assert!(!created);
        assert_eq!(guard.value, Value::Integer(1));
        assert_eq!(ks.key_count(), 1);
    }

    #[tokio::test]
    async fn key_lock_then_set_value_then_read() {
        let ks = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let (mut guard, _) = ks.create_key_and_lock(&ctx, kv("a"), Value::Integer(1)).await.unwrap();
        ks.set_value(&mut guard, Value::Integer(2));
        drop(guard);

        let read = ks.key_rlock(&ctx, &kv("a")).await.unwrap();
        assert_eq!(read.value, Value::Integer(2));
    }

    #[tokio::test]
    async fn key_lock_on_missing_key_is_not_found() {
        let ks = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let err = ks.key_lock(&ctx, &kv("missing")).await.unwrap_err();
        assert!(matches!(err, KvError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_key_removes_and_decrements_count() {
        let ks = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let (guard, _) = ks.create_key_and_lock(&ctx, kv("a"), Value::Integer(1)).await.unwrap();
        assert_eq!(ks.key_count(), 1);
        ks.delete_key(guard);
        assert_eq!(ks.key_count(), 0);
        assert!(!ks.key_exists(&kv("a")));
    }

    #[tokio::test]
    async fn eviction_kicks_in_over_capacity() {
        let mut config = KeyspaceConfig::default();
        config.max_keys = Some(1);
        config.eviction = EvictionKind::AllKeysLru;
        let ks = Keyspace::new(config);
        let ctx = Context::background();
        let (g1, _) = ks.create_key_and_lock(&ctx, kv("a"), Value::Integer(1)).await.unwrap();
        drop(g1);
        let (g2, _) = ks.create_key_and_lock(&ctx, kv("b"), Value::Integer(2)).await.unwrap();
        drop(g2);
        assert!(ks.key_count() <= 1);
    }

    #[tokio::test]
    async fn get_state_excludes_expired_keys() {
        let ks = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let (mut guard, _) = ks.create_key_and_lock(&ctx, kv("a"), Value::Integer(1)).await.unwrap();
        ks.set_expiry(&mut guard, Some(Instant::now() - Duration::from_secs(1)), false);
        drop(guard);

        let state = ks.get_state(Instant::now()).await;
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn sweep_expired_removes_timed_out_keys() {
        let ks = Keyspace::new(KeyspaceConfig::default());
        let ctx = Context::background();
        let (mut guard, _) = ks.create_key_and_lock(&ctx, kv("a"), Value::Integer(1)).await.unwrap();
        ks.set_expiry(&mut guard, Some(Instant::now() - Duration::from_secs(1)), false);
        drop(guard);

        let removed = ks.sweep_expired(Instant::now()).await;
        assert_eq!(removed, 1);
        assert!(!ks.key_exists(&kv("a")));
    }
}
