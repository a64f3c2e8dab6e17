//! Built-in cache-vary providers.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{CacheVaryProvider, CacheVaryState, RequestContext};

// ============================================================================
// accept_language
// ============================================================================

/// Varies by the client's preferred language among a supported list.
///
/// Keys are drawn from `supported` plus `default`, so the number of cache
/// slots per set is bounded whatever clients send.
#[derive(Debug, Clone)]
pub struct AcceptLanguageVary {
    default: String,
    supported: Vec<String>,
    append_to_url: bool,
}

impl AcceptLanguageVary {
    /// `default` is always supported; an empty list varies nothing.
    pub fn new(
        default: impl Into<String>,
        supported: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let default = default.into().to_ascii_lowercase();
        let mut list: Vec<String> = supported
            .into_iter()
            .map(|s| s.into().to_ascii_lowercase())
            .collect();
        if !list.contains(&default) {
            list.push(default.clone());
        }
        Self {
            default,
            supported: list,
            append_to_url: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.append_to_url = false;
        self
    }

    /// Exact tag first, then its primary subtag (`fr-CA` → `fr`).
    fn match_tag(&self, tag: &str) -> Option<String> {
        let tag = tag.to_ascii_lowercase();
        if tag.is_empty() || tag == "*" {
            return None;
        }
        if self.supported.contains(&tag) {
            return Some(tag);
        }
        let primary = tag.split('-').next()?;
        self.supported
            .iter()
            .find(|s| *s == primary)
            .cloned()
    }

    fn make(&self, key: String) -> CacheVaryState {
        CacheVaryState {
            provider: self.name().to_string(),
            key,
            append_to_url: self.append_to_url,
        }
    }
}

impl CacheVaryProvider for AcceptLanguageVary {
    fn name(&self) -> &str {
        "accept_language"
    }

    fn append_to_url(&self) -> bool {
        self.append_to_url
    }

    fn state(&self, cx: &RequestContext) -> CacheVaryState {
        let mut ranked: Vec<(&str, f32)> = cx
            .header("accept-language")
            .unwrap_or_default()
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.split(';');
                let tag = parts.next()?.trim();
                let q = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0);
                (q > 0.0).then_some((tag, q))
            })
            .collect();
        // Stable: equal weights keep header order.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let key = ranked
            .iter()
            .find_map(|(tag, _)| self.match_tag(tag))
            .unwrap_or_else(|| self.default.clone());
        self.make(key)
    }

    fn state_from_url_key(&self, key: &str) -> Option<CacheVaryState> {
        let tag = self.match_tag(key)?;
        Some(self.make(tag))
    }
}

// ============================================================================
// header
// ============================================================================

/// Key used when the header is absent or not an allowed value.
pub const HEADER_DEFAULT_KEY: &str = "none";

/// Varies by the value of one request header, matched against an
/// allow-list. Never URL-visible.
#[derive(Debug, Clone)]
pub struct HeaderVary {
    name: String,
    header: String,
    values: Vec<String>,
    default: String,
}

impl HeaderVary {
    pub fn new(
        name: impl Into<String>,
        header: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            header: header.into(),
            values: values.into_iter().map(Into::into).collect(),
            default: HEADER_DEFAULT_KEY.to_string(),
        }
    }

    /// Key for absent or unlisted values.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }
}

impl CacheVaryProvider for HeaderVary {
    fn name(&self) -> &str {
        &self.name
    }

    fn append_to_url(&self) -> bool {
        false
    }

    fn state(&self, cx: &RequestContext) -> CacheVaryState {
        let value = cx
            .header(&self.header)
            .map(str::trim)
            .and_then(|value| self.values.iter().find(|v| v.eq_ignore_ascii_case(value)))
            .unwrap_or(&self.default);
        // Encoded so `;` and `=` cannot collide with the compound key syntax.
        let key = utf8_percent_encode(value, NON_ALPHANUMERIC).to_string();
        CacheVaryState {
            provider: self.name.clone(),
            key,
            append_to_url: false,
        }
    }

    fn state_from_url_key(&self, _key: &str) -> Option<CacheVaryState> {
        None
    }
}
