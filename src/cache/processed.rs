//! Processed (filtered and minified, not yet compressed) content per
//! (set, vary key), plus the last good copy kept across invalidation.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::freshness::Fingerprint;
use crate::vary::CompoundVaryKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessedKey {
    pub set: String,
    pub vary: CompoundVaryKey,
}

#[derive(Debug, Clone)]
pub struct ProcessedContent {
    pub content: Arc<str>,
    pub version: String,
    pub fingerprints: Vec<Fingerprint>,
    pub last_modified: Option<SystemTime>,
    pub built_at: SystemTime,
    /// Invalidation generation of the set when the build started.
    pub generation: u64,
}

#[derive(Default)]
pub struct ProcessedStore {
    current: DashMap<ProcessedKey, Arc<ProcessedContent>>,
    stale: DashMap<ProcessedKey, Arc<ProcessedContent>>,
}

impl ProcessedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ProcessedKey) -> Option<Arc<ProcessedContent>> {
        self.current.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Store a fresh build; any stale copy for the key is dropped.
    pub fn put(&self, key: ProcessedKey, content: Arc<ProcessedContent>) {
        self.stale.remove(&key);
        self.current.insert(key, content);
    }

    /// Last good content, only present after an invalidation.
    pub fn stale(&self, key: &ProcessedKey) -> Option<Arc<ProcessedContent>> {
        self.stale.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Demote every current entry of `set` to stale; returns how many moved.
    pub fn invalidate_set(&self, set: &str) -> usize {
        self.demote(|key| key.set == set)
    }

    /// Demote every current entry; returns how many moved.
    pub fn invalidate_all(&self) -> usize {
        self.demote(|_| true)
    }

    fn demote(&self, matches: impl Fn(&ProcessedKey) -> bool) -> usize {
        let keys: Vec<ProcessedKey> = self
            .current
            .iter()
            .filter(|e| matches(e.key()))
            .map(|e| e.key().clone())
            .collect();
        let mut moved = 0;
        for key in keys {
            if let Some((key, content)) = self.current.remove(&key) {
                self.stale.insert(key, content);
                moved += 1;
            }
        }
        moved
    }

    /// Current entries, one per built (set, vary) pair.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
