//! Backing stores for static and embedded resources.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::ResourceError;
use crate::freshness::mtime::get_mtime;

/// Reads the bytes behind a logical resource path.
pub trait ResourceSource: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError>;

    fn last_modified(&self, _path: &str) -> Option<SystemTime> {
        None
    }

    /// File on disk backing `path`, used for change notification.
    fn local_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

// ============================================================================
// FileSource
// ============================================================================

/// Files below a root directory, addressed as `~/js/a.js` or `/js/a.js`.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical path to a file under the root.
    ///
    /// Returns `None` for paths escaping the root via `..`.
    pub fn resolve(&self, path: &str) -> Option<PathBuf> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let relative = path.trim_start_matches('~').trim_start_matches('/');
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl ResourceSource for FileSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let file = self
            .resolve(path)
            .ok_or_else(|| ResourceError::unavailable(path, "path escapes the resource root"))?;
        fs::read(&file).map_err(|e| ResourceError::unavailable(path, e))
    }

    fn last_modified(&self, path: &str) -> Option<SystemTime> {
        get_mtime(&self.resolve(path)?)
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path)
    }
}

// ============================================================================
// EmbeddedSource
// ============================================================================

/// In-memory resources registered by the host application.
#[derive(Default)]
pub struct EmbeddedSource {
    entries: RwLock<FxHashMap<String, Arc<[u8]>>>,
}

impl EmbeddedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with(self, path: impl Into<String>, content: impl Into<Arc<[u8]>>) -> Self {
        self.insert(path, content);
        self
    }

    /// Register or replace the content of `path`.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<Arc<[u8]>>) {
        self.entries.write().insert(path.into(), content.into());
    }

    pub fn remove(&self, path: &str) -> bool {
        self.entries.write().remove(path).is_some()
    }
}

impl ResourceSource for EmbeddedSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        self.entries
            .read()
            .get(path)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| ResourceError::unavailable(path, "no embedded resource registered"))
    }
}
