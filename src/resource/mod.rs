//! Resources: the individual files, generated documents and remote URLs a
//! resource set combines.
//!
//! A [`Resource`] pairs a logical path with a [`ResourceSource`] that knows
//! how to read it. Content is read lazily by the workflow and the last seen
//! fingerprint is kept for freshness checks.

mod fetch;
mod source;

pub use fetch::{Fetch, FetchSource, HttpFetcher};
pub use source::{EmbeddedSource, FileSource, ResourceSource};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::freshness::ContentHash;

/// How a resource's content is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// File on disk under the engine's base directory.
    Static,
    /// Generated on request by an in-process or same-origin generator.
    Dynamic,
    /// Bytes compiled into or registered with the process.
    Embedded,
    /// Absolute URL on another host.
    Remote,
}

impl ResourceMode {
    /// Whether a notification facility can observe changes to this mode.
    pub const fn is_watchable(self) -> bool {
        matches!(self, Self::Static)
    }
}

/// Errors raised while reading a resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("resource `{path}` is unavailable: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("resource `{path}` timed out after {timeout:?}")]
    TimedOut { path: String, timeout: Duration },

    #[error("generator for `{path}` failed: {reason}")]
    Generator { path: String, reason: String },
}

impl ResourceError {
    pub fn unavailable(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Unavailable { path, .. }
            | Self::TimedOut { path, .. }
            | Self::Generator { path, .. } => path,
        }
    }
}

/// Last-known freshness state of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceState {
    pub fingerprint: Option<ContentHash>,
    pub last_modified: Option<SystemTime>,
}

/// One member of a resource set.
pub struct Resource {
    path: String,
    mode: ResourceMode,
    in_same_application: bool,
    source: Arc<dyn ResourceSource>,
    state: RwLock<ResourceState>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl Resource {
    pub fn new(path: impl Into<String>, mode: ResourceMode, source: Arc<dyn ResourceSource>) -> Self {
        Self {
            path: path.into(),
            mode,
            in_same_application: mode != ResourceMode::Remote,
            source,
            state: RwLock::new(ResourceState::default()),
        }
    }

    /// Static file resolved against `source`'s root directory.
    pub fn file(path: impl Into<String>, source: Arc<FileSource>) -> Self {
        Self::new(path, ResourceMode::Static, source)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> ResourceMode {
        self.mode
    }

    /// Whether the resource is served by this application (not remote).
    pub fn is_in_same_application(&self) -> bool {
        self.in_same_application
    }

    /// Backing file on disk, if any.
    pub fn local_path(&self) -> Option<PathBuf> {
        self.source.local_path(&self.path)
    }

    pub fn state(&self) -> ResourceState {
        *self.state.read()
    }

    /// Read the current content and refresh the recorded fingerprint.
    pub fn read(&self) -> Result<Vec<u8>, ResourceError> {
        let bytes = self.source.read(&self.path)?;
        self.observe(&bytes);
        Ok(bytes)
    }

    /// Recompute the fingerprint from the actual bytes.
    pub fn fingerprint(&self) -> Result<ContentHash, ResourceError> {
        let bytes = self.source.read(&self.path)?;
        Ok(self.observe(&bytes))
    }

    /// Full re-read comparison against a fingerprint from a previous build.
    pub fn has_changed_since(&self, prior: ContentHash) -> Result<bool, ResourceError> {
        Ok(self.fingerprint()? != prior)
    }

    fn observe(&self, bytes: &[u8]) -> ContentHash {
        let hash = ContentHash::of(bytes);
        let mut state = self.state.write();
        state.fingerprint = Some(hash);
        // Sources without mtimes stay `None`; the ETag validates those.
        state.last_modified = self.source.last_modified(&self.path);
        hash
    }
}
