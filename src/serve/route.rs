//! Request URL to combined-set route.

use crate::workflow::url::decode_segment;

/// `{prefix}/{name}/{version}/{vary...}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub set: String,
    /// Empty when the URL names only the set; the engine then redirects.
    pub version: String,
    pub vary: Vec<String>,
}

/// Match `url` against the route prefix. Query and fragment are ignored.
pub fn parse(url: &str, prefix: &str) -> Option<Route> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;

    let mut segments = rest.split('/').map(decode_segment);
    let set = segments.next().filter(|s| !s.is_empty())?;
    let version = segments.next().unwrap_or_default();
    let mut vary: Vec<String> = segments.collect();
    while vary.last().is_some_and(String::is_empty) {
        vary.pop();
    }

    if set.contains("..") || version.contains('/') {
        return None;
    }
    Some(Route { set, version, vary })
}
