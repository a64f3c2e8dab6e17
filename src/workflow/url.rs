//! Public URLs of combined sets: `{url}/{name}/{version}/{vary keys...}`.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters escaped in a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

pub fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Combined URL for a set at `version`.
pub fn combined_url(prefix: &str, name: &str, version: &str, vary_suffix: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = encode_segment(name);
    if vary_suffix.is_empty() {
        format!("{prefix}/{name}/{version}/")
    } else {
        let suffix = vary_suffix
            .split('/')
            .map(encode_segment)
            .collect::<Vec<_>>()
            .join("/");
        format!("{prefix}/{name}/{version}/{suffix}")
    }
}

/// Debug-mode URL of one resource: its own path plus a content fingerprint.
pub fn resource_url(path: &str, fingerprint: &str) -> String {
    let path = path.strip_prefix('~').unwrap_or(path);
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_url() {
        assert_eq!(
            combined_url("/combres/", "app.js", "abc123", ""),
            "/combres/app.js/abc123/"
        );
        assert_eq!(
            combined_url("/combres", "site css", "v1", "fr"),
            "/combres/site%20css/v1/fr"
        );
    }

    #[test]
    fn test_segment_roundtrip_of_reserved_chars() {
        let encoded = encode_segment("a/b?c");
        assert_eq!(encoded, "a%2Fb%3Fc");
        assert_eq!(decode_segment(&encoded), "a/b?c");
    }

    #[test]
    fn test_resource_url() {
        assert_eq!(resource_url("~/js/a.js", "0badf00d"), "/js/a.js?0badf00d");
        assert_eq!(resource_url("/gen.js?x=1", "0badf00d"), "/gen.js?x=1&0badf00d");
    }
}
