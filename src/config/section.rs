//! `[engine]` and `[serve]` sections.
//!
//! # Example
//!
//! ```toml
//! [engine]
//! url = "/combres"            # Route prefix of combined URLs
//! base_dir = "public"         # Root of static resources, relative to this file
//! max_age = 2592000           # Cache-Control max-age in seconds
//! fail_open = false           # Serve unminified/uncompressed on transform failure
//! pull_checks = true          # Compare fingerprints at lookup time
//! freshness_interval_ms = 0   # Minimum spacing of pull checks (0 = every request)
//! remote_timeout_ms = 10000   # Bound on remote and dynamic reads
//! app_origin = "http://127.0.0.1:8080"  # Origin serving dynamic resources
//! compressors = ["gzip", "deflate"]
//! compression_level = 6
//!
//! [serve]
//! interface = "127.0.0.1"
//! port = 5277
//! watch = true
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::compress::Encoding;
use crate::workflow::Settings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub url: String,
    pub base_dir: PathBuf,
    /// Seconds.
    pub max_age: u64,
    pub fail_open: bool,
    pub pull_checks: bool,
    pub freshness_interval_ms: u64,
    pub remote_timeout_ms: u64,
    pub app_origin: Option<String>,
    pub compressors: Vec<Encoding>,
    pub compression_level: u32,
    /// Defaults for sets that do not set their own.
    pub debug_enabled: bool,
    pub ignore_pipeline_when_debug: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            url: settings.url,
            base_dir: PathBuf::from("."),
            max_age: settings.max_age.as_secs(),
            fail_open: settings.fail_open,
            pull_checks: true,
            freshness_interval_ms: 0,
            remote_timeout_ms: 10_000,
            app_origin: None,
            compressors: vec![Encoding::Gzip],
            compression_level: 6,
            debug_enabled: false,
            ignore_pipeline_when_debug: false,
        }
    }
}

impl EngineSection {
    pub fn settings(&self) -> Settings {
        Settings {
            url: self.url.clone(),
            fail_open: self.fail_open,
            freshness_interval: self
                .pull_checks
                .then(|| Duration::from_millis(self.freshness_interval_ms)),
            max_age: Duration::from_secs(self.max_age),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

/// HTTP front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSection {
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces
    pub interface: IpAddr,
    pub port: u16,
    /// Invalidate sets as their files change.
    pub watch: bool,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5277,
            watch: true,
        }
    }
}
