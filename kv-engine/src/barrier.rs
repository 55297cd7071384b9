//! # State-Copy Barrier
//!
//! §4.8: snapshotting and AOF rewrite both need a consistent read of the
//! whole keyspace without stopping every writer for the duration of the
//! copy. A pair of atomic flags coordinates the two sides:
//!
//! - A writer checks `state_copy_in_progress` before mutating; if a copy is
//!   underway it waits.
//! - A copier sets `state_copy_in_progress`, waits for any writer already
//!   past that check to finish (`state_mutation_in_progress` drops to
//!   zero), takes its snapshot, then clears the flag.
//!
//! This keeps the common path (no snapshot running) lock-free: a writer
//! only ever touches two atomics, never a mutex.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared barrier state. Clone to hand the same barrier to the keyspace,
/// the AOF writer, and the snapshot engine.
#[derive(Clone, Default)]
pub struct StateCopyBarrier {
    inner: Arc<BarrierInner>,
}

#[derive(Default)]
struct BarrierInner {
    copy_in_progress: AtomicBool,
    mutators_in_flight: AtomicU64,
}

/// RAII guard held by a writer for the duration of a mutation. Decrements
/// the in-flight counter on drop.
pub struct MutationGuard {
    inner: Arc<BarrierInner>,
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        self.inner.mutators_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// RAII guard held by the copier for the duration of the snapshot read.
/// Clears `copy_in_progress` on drop.
pub struct CopyGuard {
    inner: Arc<BarrierInner>,
}

impl Drop for CopyGuard {
    fn drop(&mut self) {
        self.inner.copy_in_progress.store(false, Ordering::Release);
    }
}

impl StateCopyBarrier {
    pub fn new() -> Self {
        StateCopyBarrier { inner: Arc::new(BarrierInner::default()) }
    }

    /// Called before a mutating operation touches the keyspace. Spins
    /// briefly while a copy is in progress, then registers as in-flight.
    pub async fn enter_mutation(&self) -> MutationGuard {
        loop {
            if !self.inner.copy_in_progress.load(Ordering::Acquire) {
                self.inner.mutators_in_flight.fetch_add(1, Ordering::AcqRel);
                // Re-check: a copy may have started between our load and
                // the increment above. If so, back out and retry so we
                // never mutate underneath an in-progress copy.
                if self.inner.copy_in_progress.load(Ordering::Acquire) {
                    self.inner.mutators_in_flight.fetch_sub(1, Ordering::AcqRel);
                    tokio::task::yield_now().await;
                    continue;
                }
                return MutationGuard { inner: self.inner.clone() };
            }
            tokio::time::sleep(Duration::from_micros(50)).await;
        }
    }

    /// Called before taking a state snapshot. Blocks new mutators, then
    /// waits for any mutation already past the `enter_mutation` check to
    /// finish before returning.
    pub async fn enter_copy(&self) -> CopyGuard {
        loop {
            if self
                .inner
                .copy_in_progress
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_micros(50)).await;
        }
        while self.inner.mutators_in_flight.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(Duration::from_micros(50)).await;
        }
        CopyGuard { inner: self.inner.clone() }
    }

    pub fn is_copy_in_progress(&self) -> bool {
        self.inner.copy_in_progress.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn mutation_guard_decrements_on_drop() {
        let barrier = StateCopyBarrier::new();
        let guard = barrier.enter_mutation().await;
        assert_eq!(barrier.inner.mutators_in_flight.load(Ordering::Acquire), 1);
        drop(guard);
        assert_eq!(barrier.inner.mutators_in_flight.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn copy_guard_clears_flag_on_drop() {
        let barrier = StateCopyBarrier::new();
        let guard = barrier.enter_copy().await;
        assert!(barrier.is_copy_in_progress());
        drop(guard);
        assert!(!barrier.is_copy_in_progress());
    }

    #[tokio::test]
    async fn copy_waits_for_in_flight_mutation() {
        let barrier = StateCopyBarrier::new();
        let order = Arc::new(AtomicUsize::new(0));

        let mutation_guard = barrier.enter_mutation().await;
        let barrier_clone = barrier.clone();
        let order_clone = order.clone();
        let copy_task = tokio::spawn(async move {
            let _copy_guard = barrier_clone.enter_copy().await;
            order_clone.fetch_add(1, Ordering::AcqRel);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(order.load(Ordering::Acquire), 0);
        drop(mutation_guard);

        copy_task.await.unwrap();
        assert_eq!(order.load(Ordering::Acquire), 1);
    }
}
