//! Artifact cache: compressed, versioned outputs keyed by
//! (set, version, compound vary key, encoding).
//!
//! The engine owns invalidation policy; a cache only has to evict every
//! entry of a set on request. [`MemoryCache`] is the in-process default.

mod guard;
mod processed;

pub use guard::{BuildGuard, BuildGuards};
pub use processed::{ProcessedContent, ProcessedKey, ProcessedStore};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

use crate::compress::Encoding;
use crate::vary::CompoundVaryKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub set: String,
    pub version: String,
    pub vary: CompoundVaryKey,
    pub encoding: Encoding,
}

/// A served, possibly compressed, build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub content: Arc<[u8]>,
    /// Version token of the uncompressed processed content.
    pub version: String,
    pub encoding: Encoding,
    pub content_type: &'static str,
    pub created_at: SystemTime,
    /// Newest modification time among the set's resources.
    pub last_modified: Option<SystemTime>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("artifact cache backend failed: {0}")]
    Backend(String),
}

/// Storage for artifacts. Implementations must be thread-safe.
pub trait ArtifactCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<Artifact>>, CacheError>;

    fn put(&self, key: CacheKey, artifact: Arc<Artifact>) -> Result<(), CacheError>;

    /// Evict every entry of `set`; returns the number removed.
    fn invalidate_set(&self, set: &str) -> Result<usize, CacheError>;

    /// Evict everything; returns the number removed.
    fn invalidate_all(&self) -> Result<usize, CacheError>;
}

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, Arc<Artifact>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArtifactCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<Artifact>>, CacheError> {
        Ok(self.entries.get(key).map(|e| Arc::clone(e.value())))
    }

    fn put(&self, key: CacheKey, artifact: Arc<Artifact>) -> Result<(), CacheError> {
        self.entries.insert(key, artifact);
        Ok(())
    }

    fn invalidate_set(&self, set: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.set != set);
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn invalidate_all(&self) -> Result<usize, CacheError> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }
}
