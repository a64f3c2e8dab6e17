//! Mtime lookup for `Last-Modified` headers.
//!
//! Timestamps are advisory only. Change detection always goes through
//! content hashes, so a `git checkout` that resets mtimes never serves
//! stale bytes.

use std::path::Path;
use std::time::SystemTime;

/// Get the modification time of a file
///
/// Returns `None` if the file doesn't exist or mtime cannot be read
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// Latest of a set of timestamps, or `None` if any of them is unknown.
pub fn latest(times: impl IntoIterator<Item = Option<SystemTime>>) -> Option<SystemTime> {
    times.into_iter().collect::<Option<Vec<_>>>()?.into_iter().max()
}
