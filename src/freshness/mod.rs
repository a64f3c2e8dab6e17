//! Freshness detection: blake3 content hashes for resources and artifacts,
//! mtime for `Last-Modified`.

mod cache;
mod hash;
pub mod mtime;

pub use cache::{Fingerprint, FingerprintCache, normalize_path};
pub use hash::ContentHash;
