//! # Eviction Policy
//!
//! Purpose: Track access/insertion metadata for every resident key and pick
//! a victim when the keyspace is over its configured capacity.
//!
//! ## Design Principles
//! 1. **Scope-Aware**: `volatile-*` variants only ever index keys that carry
//!    a TTL; `allkeys-*` variants index everything.
//! 2. **One Structure Per Variant**: only the bookkeeping the active policy
//!    needs is allocated — `noeviction` allocates nothing.
//! 3. **Tie-Break on Recency**: LRU/LFU/TTL ties favor the less recently
//!    touched key, implemented by pairing every ordering key with a
//!    monotonic sequence number.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use kv_core::Key;
use rand::seq::IteratorRandom;

/// Eviction policy variants (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionKind {
    NoEviction,
    AllKeysLru,
    AllKeysLfu,
    VolatileLru,
    VolatileLfu,
    AllKeysRandom,
    VolatileRandom,
    VolatileTtl,
}

impl EvictionKind {
    /// True if this variant only ever considers volatile (TTL-bearing) keys.
    pub fn is_volatile_scoped(self) -> bool {
        matches!(
            self,
            EvictionKind::VolatileLru
                | EvictionKind::VolatileLfu
                | EvictionKind::VolatileRandom
                | EvictionKind::VolatileTtl
        )
    }
}

/// Monotonic counter used to break ties in favor of the less recently
/// touched key, and as the LFU heap's secondary sort key.
fn next_seq() -> u64 {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Bookkeeping for every eviction variant. Only the field matching `kind` is
/// ever populated.
pub struct EvictionTracker {
    kind: EvictionKind,
    /// `allkeys-lru` / `volatile-lru`: ordered by last-touch sequence.
    lru: BTreeSet<(u64, Key)>,
    lru_seq_of: hashbrown::HashMap<Key, u64>,
    /// `allkeys-lfu` / `volatile-lfu`: ordered by (access count, first-touch
    /// sequence) so ties favor the key touched least recently.
    lfu: BTreeSet<(u64, u64, Key)>,
    lfu_state_of: hashbrown::HashMap<Key, (u64, u64)>,
    /// `allkeys-random` / `volatile-random`: flat membership for sampling.
    random_members: hashbrown::HashSet<Key>,
    /// `volatile-ttl`: ordered by absolute expiry instant.
    ttl: BTreeSet<(Instant, Key)>,
    ttl_of: hashbrown::HashMap<Key, Instant>,
}

impl EvictionTracker {
    pub fn new(kind: EvictionKind) -> Self {
        EvictionTracker {
            kind,
            lru: BTreeSet::new(),
            lru_seq_of: hashbrown::HashMap::new(),
            lfu: BTreeSet::new(),
            lfu_state_of: hashbrown::HashMap::new(),
            random_members: hashbrown::HashSet::new(),
            ttl: BTreeSet::new(),
            ttl_of: hashbrown::HashMap::new(),
        }
    }

    pub fn kind(&self) -> EvictionKind {
        self.kind
    }

    fn in_scope(&self, is_volatile: bool) -> bool {
        if self.kind == EvictionKind::NoEviction {
            return false;
        }
        !self.kind.is_volatile_scoped() || is_volatile
    }

    /// Called on every successful read or write of a resident key.
    pub fn on_access(&mut self, key: &Key, is_volatile: bool) {
        if !self.in_scope(is_volatile) {
            return;
        }
        match self.kind {
            EvictionKind::AllKeysLru | EvictionKind::VolatileLru => self.touch_lru(key),
            EvictionKind::AllKeysLfu | EvictionKind::VolatileLfu => self.bump_lfu(key),
            _ => {}
        }
    }

    /// Called when a new key is inserted, or an existing key's TTL changes
    /// (so volatile-scoped policies can start/stop tracking it).
    pub fn on_insert(&mut self, key: &Key, is_volatile: bool, expire_at: Option<Instant>) {
        if self.kind == EvictionKind::AllKeysRandom || self.kind == EvictionKind::VolatileRandom {
            if self.in_scope(is_volatile) {
                self.random_members.insert(key.clone());
            } else {
                self.random_members.remove(key);
            }
        }

        if self.kind == EvictionKind::VolatileTtl {
            if let Some(deadline) = expire_at {
                self.reindex_ttl(key, deadline);
            } else {
                self.remove_ttl(key);
            }
        }

        if !self.in_scope(is_volatile) {
            return;
        }
        match self.kind {
            EvictionKind::AllKeysLru | EvictionKind::VolatileLru => self.touch_lru(key),
            EvictionKind::AllKeysLfu | EvictionKind::VolatileLfu => self.bump_lfu(key),
            _ => {}
        }
    }

    /// Called when a key is removed, expired, or evicted.
    pub fn on_delete(&mut self, key: &Key) {
        if let Some(seq) = self.lru_seq_of.remove(key) {
            self.lru.remove(&(seq, key.clone()));
        }
        if let Some(state) = self.lfu_state_of.remove(key) {
            self.lfu.remove(&(state.0, state.1, key.clone()));
        }
        self.random_members.remove(key);
        self.remove_ttl(key);
    }

    /// Returns a key to evict, or `None` if no eligible key exists.
    pub fn select_victim(&self) -> Option<Key> {
        self.select_victim_excluding(&hashbrown::HashSet::new())
    }

    /// Same as [`EvictionTracker::select_victim`], skipping any key already
    /// in `exclude`. Used to step past a candidate whose own slot lock is
    /// currently held elsewhere without removing it from the tracker.
    pub fn select_victim_excluding(&self, exclude: &hashbrown::HashSet<Key>) -> Option<Key> {
        match self.kind {
            EvictionKind::NoEviction => None,
            EvictionKind::AllKeysLru | EvictionKind::VolatileLru => {
                self.lru.iter().map(|(_, k)| k).find(|k| !exclude.contains(*k)).cloned()
            }
            EvictionKind::AllKeysLfu | EvictionKind::VolatileLfu => {
                self.lfu.iter().map(|(_, _, k)| k).find(|k| !exclude.contains(*k)).cloned()
            }
            EvictionKind::AllKeysRandom | EvictionKind::VolatileRandom => {
                let mut rng = rand::thread_rng();
                self.random_members.iter().filter(|k| !exclude.contains(*k)).choose(&mut rng).cloned()
            }
            EvictionKind::VolatileTtl => {
                self.ttl.iter().map(|(_, k)| k).find(|k| !exclude.contains(*k)).cloned()
            }
        }
    }

    fn touch_lru(&mut self, key: &Key) {
        if let Some(old_seq) = self.lru_seq_of.remove(key) {
            self.lru.remove(&(old_seq, key.clone()));
        }
        let seq = next_seq();
        self.lru.insert((seq, key.clone()));
        self.lru_seq_of.insert(key.clone(), seq);
    }

    fn bump_lfu(&mut self, key: &Key) {
        let (count, _first_seq) = self.lfu_state_of.get(key).copied().unwrap_or((0, next_seq()));
        if let Some(old) = self.lfu_state_of.get(key).copied() {
            self.lfu.remove(&(old.0, old.1, key.clone()));
        }
        let new_count = count + 1;
        let seq = self.lfu_state_of.get(key).map(|s| s.1).unwrap_or_else(next_seq);
        self.lfu.insert((new_count, seq, key.clone()));
        self.lfu_state_of.insert(key.clone(), (new_count, seq));
    }

    fn reindex_ttl(&mut self, key: &Key, deadline: Instant) {
        self.remove_ttl(key);
        self.ttl.insert((deadline, key.clone()));
        self.ttl_of.insert(key.clone(), deadline);
    }

    fn remove_ttl(&mut self, key: &Key) {
        if let Some(deadline) = self.ttl_of.remove(key) {
            self.ttl.remove(&(deadline, key.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn lru_evicts_least_recently_touched_first() {
        let mut tracker = EvictionTracker::new(EvictionKind::AllKeysLru);
        let a = Key::from("a");
        let b = Key::from("b");
        tracker.on_insert(&a, false, None);
        tracker.on_insert(&b, false, None);
        tracker.on_access(&a, false);
        assert_eq!(tracker.select_victim(), Some(b));
    }

    #[test]
    fn lfu_evicts_least_frequently_accessed() {
        let mut tracker = EvictionTracker::new(EvictionKind::AllKeysLfu);
        let a = Key::from("a");
        let b = Key::from("b");
        tracker.on_insert(&a, false, None);
        tracker.on_insert(&b, false, None);
        tracker.on_access(&a, false);
        tracker.on_access(&a, false);
        assert_eq!(tracker.select_victim(), Some(b));
    }

    #[test]
    fn volatile_scope_ignores_non_volatile_keys() {
        let mut tracker = EvictionTracker::new(EvictionKind::VolatileLru);
        let a = Key::from("a");
        tracker.on_insert(&a, false, None);
        assert_eq!(tracker.select_victim(), None);

        let b = Key::from("b");
        tracker.on_insert(&b, true, Some(Instant::now() + Duration::from_secs(10)));
        assert_eq!(tracker.select_victim(), Some(b));
    }

    #[test]
    fn ttl_policy_prefers_nearest_deadline() {
        let mut tracker = EvictionTracker::new(EvictionKind::VolatileTtl);
        let now = Instant::now();
        let soon = Key::from("soon");
        let later = Key::from("later");
        tracker.on_insert(&later, true, Some(now + Duration::from_secs(100)));
        tracker.on_insert(&soon, true, Some(now + Duration::from_secs(1)));
        assert_eq!(tracker.select_victim(), Some(soon));
    }

    #[test]
    fn on_delete_removes_from_every_structure() {
        let mut tracker = EvictionTracker::new(EvictionKind::AllKeysLru);
        let a = Key::from("a");
        tracker.on_insert(&a, false, None);
        tracker.on_delete(&a);
        assert_eq!(tracker.select_victim(), None);
    }

    #[test]
    fn noeviction_never_selects_a_victim() {
        let mut tracker = EvictionTracker::new(EvictionKind::NoEviction);
        let a = Key::from("a");
        tracker.on_insert(&a, false, None);
        tracker.on_access(&a, false);
        assert_eq!(tracker.select_victim(), None);
    }
}
