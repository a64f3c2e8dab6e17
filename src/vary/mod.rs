//! Cache-vary providers: request-dependent dimensions (locale, a header
//! value) along which several cached variants of one set coexist.

mod providers;

pub use providers::{AcceptLanguageVary, HEADER_DEFAULT_KEY, HeaderVary};

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// What a provider may inspect about a request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: FxHashMap<String, String>,
    vary_segments: Vec<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header names are case-insensitive.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Path segments following `{url}/{name}/{version}/`.
    pub fn with_vary_segments(mut self, segments: Vec<String>) -> Self {
        self.vary_segments = segments;
        self
    }

    pub fn vary_segments(&self) -> &[String] {
        &self.vary_segments
    }
}

/// State one provider derived from a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVaryState {
    pub provider: String,
    pub key: String,
    pub append_to_url: bool,
}

pub trait CacheVaryProvider: Send + Sync {
    /// Stable name, part of the compound key.
    fn name(&self) -> &str;

    fn append_to_url(&self) -> bool;

    fn state(&self, cx: &RequestContext) -> CacheVaryState;

    /// Rebuild a state from a key found in the URL. `None` rejects the key.
    fn state_from_url_key(&self, key: &str) -> Option<CacheVaryState>;
}

/// One state per provider, in declared order.
///
/// URL-visible providers consume the request's vary segments left to right;
/// a missing or rejected segment falls back to deriving the state from the
/// request itself.
pub fn collect_states(
    providers: &[Arc<dyn CacheVaryProvider>],
    cx: &RequestContext,
) -> Vec<CacheVaryState> {
    let mut segments = cx.vary_segments().iter();
    providers
        .iter()
        .map(|provider| {
            if provider.append_to_url()
                && let Some(state) = segments
                    .next()
                    .and_then(|key| provider.state_from_url_key(key))
            {
                return state;
            }
            provider.state(cx)
        })
        .collect()
}

/// Deterministic key formed from every state of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompoundVaryKey(String);

impl CompoundVaryKey {
    pub fn from_states(states: &[CacheVaryState]) -> Self {
        let key = states
            .iter()
            .map(|s| format!("{}={}", s.provider, s.key))
            .collect::<Vec<_>>()
            .join(";");
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for CompoundVaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trailing URL path for the URL-visible states.
pub fn url_suffix(states: &[CacheVaryState]) -> String {
    states
        .iter()
        .filter(|s| s.append_to_url)
        .map(|s| s.key.as_str())
        .collect::<Vec<_>>()
        .join("/")
}
