//! Per-set record of the resource fingerprints an artifact was built from.
//!
//! The workflow records fingerprints after every successful build. Pull
//! checks compare them against freshly read content, and push invalidation
//! uses the local-path index to find which sets a changed file belongs to.

use dashmap::DashMap;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use super::ContentHash;

/// Fingerprint of one resource as seen by a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Logical resource path.
    pub path: String,
    pub hash: ContentHash,
    /// Backing file, when the resource lives on disk.
    pub local_path: Option<PathBuf>,
}

/// Fingerprints keyed by set name (thread-safe).
#[derive(Default)]
pub struct FingerprintCache {
    by_set: DashMap<String, Vec<Fingerprint>>,
    watched: DashMap<PathBuf, FxHashSet<String>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the fingerprints recorded for `set`.
    pub fn record(&self, set: &str, fingerprints: Vec<Fingerprint>) {
        for local in fingerprints.iter().filter_map(|f| f.local_path.as_deref()) {
            self.watched
                .entry(normalize_path(local))
                .or_default()
                .insert(set.to_string());
        }
        self.by_set.insert(set.to_string(), fingerprints);
    }

    pub fn get(&self, set: &str) -> Option<Vec<Fingerprint>> {
        self.by_set.get(set).map(|r| r.clone())
    }

    /// Drop the fingerprints of `set`; the watch index is kept so later
    /// changes to the same files still reach the set.
    pub fn forget(&self, set: &str) {
        self.by_set.remove(set);
    }

    pub fn clear(&self) {
        self.by_set.clear();
    }

    /// Names of sets whose last build read `path`.
    pub fn sets_watching(&self, path: &Path) -> Vec<String> {
        let mut names: Vec<_> = self
            .watched
            .get(&normalize_path(path))
            .map(|sets| sets.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Canonicalize a path, falling back to canonicalizing the parent for files
/// that no longer exist (removal events).
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
