//! Per-key build guards: at most one build per key runs at a time, and
//! concurrent requesters for the same key wait for it instead of building.

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::hash::Hash;
use std::sync::Arc;

pub struct BuildGuards<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash> Default for BuildGuards<K> {
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> BuildGuards<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the guard for `key` is free, then hold it.
    pub fn lock(&self, key: K) -> BuildGuard<'_, K> {
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = mutex.lock_arc();
        BuildGuard {
            owner: self,
            key,
            guard: Some(guard),
        }
    }
}

/// Held while building; releases and prunes the key on drop.
pub struct BuildGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a BuildGuards<K>,
    key: K,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K: Eq + Hash + Clone> Drop for BuildGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's reference left: nobody is waiting.
        self.owner
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_serializes_same_key() {
        let guards = Arc::new(BuildGuards::<String>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guards = Arc::clone(&guards);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = guards.lock("app.js".to_string());
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(guards.locks.len(), 0);
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let guards = BuildGuards::<&str>::new();
        let _a = guards.lock("a.js");
        let _b = guards.lock("b.js");
        assert_eq!(guards.locks.len(), 2);
    }

    #[test]
    fn test_released_key_is_pruned() {
        let guards = BuildGuards::<&str>::new();
        drop(guards.lock("a.js"));
        assert_eq!(guards.locks.len(), 0);
    }
}
