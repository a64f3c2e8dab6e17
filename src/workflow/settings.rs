use std::time::Duration;

const THIRTY_DAYS: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Engine-wide behavior shared by every set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Route prefix of combined URLs.
    pub url: String,
    /// Serve unminified or uncompressed content when a transform fails.
    pub fail_open: bool,
    /// Minimum spacing of pull checks per set. `Some(ZERO)` checks on every
    /// request, `None` disables pull checks (push invalidation only).
    pub freshness_interval: Option<Duration>,
    /// Default Cache-Control max-age.
    pub max_age: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: "/combres".to_string(),
            fail_open: false,
            freshness_interval: Some(Duration::ZERO),
            max_age: THIRTY_DAYS,
        }
    }
}

impl Settings {
    /// Route prefix without a trailing slash.
    pub fn url_prefix(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}
