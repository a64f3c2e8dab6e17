//! Collects changed resource paths until the file system goes quiet.
//!
//! Every kind of change ends in the same invalidation, so a batch is just
//! a set of paths plus two timestamps.

use notify::EventKind;
use notify::event::ModifyKind;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::debug;
use crate::freshness::normalize_path;

/// Quiet period after the last change before a batch is flushed.
pub(super) const QUIET: Duration = Duration::from_millis(300);
/// Minimum gap between two flushes.
pub(super) const COOLDOWN: Duration = Duration::from_millis(800);
/// Poll interval while nothing is pending.
pub(super) const IDLE: Duration = Duration::from_secs(1);

/// Editor swap, backup and hidden files never belong to a set.
const ARTIFACT_EXTENSIONS: &[&str] = &["bak", "bck", "backup", "swo", "swp", "tmp"];

#[derive(Debug, Default)]
pub(super) struct ChangeBatch {
    paths: FxHashSet<PathBuf>,
    last_change: Option<Instant>,
    last_flush: Option<Instant>,
}

impl ChangeBatch {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Add the paths of a content-affecting event; others are ignored.
    pub(super) fn record(&mut self, event: &notify::Event, now: Instant) {
        if !affects_content(&event.kind) {
            return;
        }
        let before = self.paths.len();
        let mut relevant = false;
        for path in event.paths.iter().filter(|p| !is_editor_artifact(p)) {
            self.paths.insert(normalize_path(path));
            relevant = true;
        }
        if relevant {
            // Repeated writes to a pending path still extend the quiet period.
            self.last_change = Some(now);
            debug!("watch"; "{:?}: {} pending (+{})", event.kind, self.paths.len(), self.paths.len() - before);
        }
    }

    /// Pending paths, sorted, once the batch is quiet and out of cooldown.
    pub(super) fn flush(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        if self.paths.is_empty() || !self.wait(now).is_zero() {
            return None;
        }
        let mut paths: Vec<PathBuf> = self.paths.drain().collect();
        paths.sort();
        self.last_change = None;
        self.last_flush = Some(now);
        Some(paths)
    }

    /// Time left before [`flush`](Self::flush) can succeed.
    pub(super) fn wait(&self, now: Instant) -> Duration {
        let Some(last_change) = self.last_change else {
            return IDLE;
        };
        let quiet = QUIET.saturating_sub(now.saturating_duration_since(last_change));
        let cooldown = self
            .last_flush
            .map_or(Duration::ZERO, |t| COOLDOWN.saturating_sub(now.saturating_duration_since(t)));
        quiet.max(cooldown)
    }
}

fn affects_content(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(modify) => !matches!(modify, ModifyKind::Metadata(_)),
        _ => false,
    }
}

fn is_editor_artifact(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    name.starts_with('.') || name.ends_with('~') || ARTIFACT_EXTENSIONS.contains(&ext)
}
