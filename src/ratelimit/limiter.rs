//! Rate limiter trait and the per-key state map shared by its implementations.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

/// A rate limiting algorithm tracking independent state per key.
///
/// Implementations are thread-safe and never block waiting for capacity:
/// a call either takes a permit or is denied immediately.
pub trait RateLimiter: Send + Sync + Debug {
    /// Try to take one permit for `key`.
    ///
    /// Returns `true` if the request is admitted, `false` if over limit.
    fn try_acquire(&self, key: &str) -> bool;

    /// Number of keys currently holding state.
    fn tracked_keys(&self) -> usize;

    /// Drop state that can no longer influence a decision.
    ///
    /// Returns the number of keys removed. Algorithms whose state never
    /// expires keep the default no-op.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// Concurrent key → state map with one lock per key.
///
/// The map itself is sharded, and each entry holds its own mutex, so a
/// read-modify-write on one key never waits on another key's update.
#[derive(Debug)]
pub(crate) struct KeyedState<S> {
    map: DashMap<String, Arc<Mutex<S>>>,
}

impl<S> KeyedState<S> {
    pub(crate) fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Run `update` against the state for `key` while holding that key's lock,
    /// creating the state with `init` if the key is new.
    pub(crate) fn update<R>(
        &self,
        key: &str,
        init: impl FnOnce() -> S,
        update: impl FnOnce(&mut S) -> R,
    ) -> R {
        // The shard guard must be released before taking the entry lock below.
        let existing = self.map.get(key).map(|cell| Arc::clone(cell.value()));
        let cell = match existing {
            Some(cell) => cell,
            None => Arc::clone(
                self.map
                    .entry(key.to_owned())
                    .or_insert_with(|| Arc::new(Mutex::new(init())))
                    .value(),
            ),
        };

        let mut state = cell.lock();
        update(&mut *state)
    }

    /// Read the state for `key` without creating it.
    pub(crate) fn peek<R>(&self, key: &str, read: impl FnOnce(&S) -> R) -> Option<R> {
        let cell = self.map.get(key).map(|cell| Arc::clone(cell.value()))?;
        let state = cell.lock();
        Some(read(&*state))
    }

    /// Remove every entry for which `keep` returns false, returning how many
    /// were removed. Shards are locked one at a time.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&S) -> bool) -> usize {
        let mut removed = 0;
        self.map.retain(|_, cell| {
            let kept = keep(&*cell.lock());
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&self) {
        self.map.clear();
    }
}
