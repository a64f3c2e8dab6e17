use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters, updated lock-free.
#[derive(Debug, Default)]
pub struct Stats {
    builds: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    stale_served: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Processed builds (read, filter, combine, minify).
    pub builds: u64,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub stale_served: u64,
    /// Processed (set, vary) entries currently cached.
    pub variants: usize,
}

impl Stats {
    pub(super) fn build(&self) {
        self.builds.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn stale(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            builds: self.builds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            stale_served: self.stale_served.load(Ordering::Relaxed),
            variants: 0,
        }
    }
}
