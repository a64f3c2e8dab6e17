//! The processed build of one set for one vary state:
//! read, filter, concatenate, filter again, minify, version.

use std::borrow::Cow;
use std::time::SystemTime;

use super::ProcessError;
use crate::filter::{self, FilterContext};
use crate::freshness::{ContentHash, Fingerprint, mtime};
use crate::set::ResourceSet;
use crate::vary::CacheVaryState;
use crate::{debug, log};

pub(super) struct BuildOutput {
    pub content: String,
    pub version: String,
    pub fingerprints: Vec<Fingerprint>,
    pub last_modified: Option<SystemTime>,
}

pub(super) fn build(
    set: &ResourceSet,
    vary: &[CacheVaryState],
    fail_open: bool,
) -> Result<BuildOutput, ProcessError> {
    let cx = FilterContext { set, vary };
    let filter_failure = |failed: filter::FailedFilter| ProcessError::FilterFailure {
        set: set.name().to_string(),
        filter: failed.kind,
        source: failed.error,
    };

    let mut combined = String::new();
    let mut fingerprints = Vec::with_capacity(set.resources().len());
    for resource in set.resources() {
        let bytes = resource.read()?;
        fingerprints.push(Fingerprint {
            path: resource.path().to_string(),
            hash: ContentHash::of(&bytes),
            local_path: resource.local_path(),
        });
        let text = decode(&bytes).into_owned();
        let text = filter::apply_single(&cx, resource, text).map_err(filter_failure)?;
        combined.push_str(&text);
    }
    let combined = filter::apply_combined(&cx, combined).map_err(filter_failure)?;

    let minifier = set.minifier();
    let content = if !minifier.can_apply_to(set.resource_type()) {
        debug!("build"; "{}: minifier `{}` skipped for {}", set.name(), minifier.info().kind(), set.resource_type().label());
        combined
    } else {
        match minifier.minify(&combined) {
            Ok(minified) => minified,
            Err(e) if fail_open => {
                log!("warning"; "{}: {e}, serving unminified", set.name());
                combined
            }
            Err(source) => {
                log!("error"; "{}: {source}", set.name());
                return Err(ProcessError::MinificationFailure {
                    set: set.name().to_string(),
                    source,
                });
            }
        }
    };

    let version = ContentHash::of(content.as_bytes()).version_token();
    let last_modified = mtime::latest(set.resources().iter().map(|r| r.state().last_modified));
    debug!("build"; "{} [{}]: {} resources, {} bytes", set.name(), version, set.resources().len(), content.len());

    Ok(BuildOutput {
        content,
        version,
        fingerprints,
        last_modified,
    })
}

/// UTF-8 text of a resource, lossy on invalid input, without a BOM.
pub(super) fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ContentFilter;
    use crate::filter::css::CssVariables;
    use crate::minify::{CssMinifier, JsMinifier};
    use crate::resource::{EmbeddedSource, Resource, ResourceMode};
    use crate::set::ResourceType;
    use std::sync::Arc;

    fn embedded(entries: &[(&str, &str)]) -> Vec<Resource> {
        let source = Arc::new(EmbeddedSource::new());
        entries
            .iter()
            .map(|(path, body)| {
                source.insert(*path, body.as_bytes());
                Resource::new(*path, ResourceMode::Embedded, source.clone())
            })
            .collect()
    }

    #[test]
    fn test_concatenates_in_order_without_separator() {
        let set = ResourceSet::builder("app.js", ResourceType::Script)
            .resources(embedded(&[("/b.js", "var b=2;"), ("/a.js", "var a=1;")]))
            .build()
            .unwrap();
        let out = build(&set, &[], false).unwrap();
        assert_eq!(out.content, "var b=2;var a=1;");
        assert_eq!(out.fingerprints.len(), 2);
        assert_eq!(out.fingerprints[0].path, "/b.js");
        assert_eq!(out.version, ContentHash::of(b"var b=2;var a=1;").version_token());
    }

    #[test]
    fn test_decode_strips_bom_and_replaces_invalid() {
        assert_eq!(decode(b"\xEF\xBB\xBFvar a;"), "var a;");
        assert_eq!(decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_filters_then_minify() {
        let set = ResourceSet::builder("site.css", ResourceType::Stylesheet)
            .resources(embedded(&[(
                "/site.css",
                "@define { brand: #ff0000; }\nbody { color: @brand; }\n",
            )]))
            .filter(ContentFilter::single(CssVariables))
            .minifier(Arc::new(CssMinifier))
            .build()
            .unwrap();
        assert_eq!(build(&set, &[], false).unwrap().content, "body{color:red}");
    }

    #[test]
    fn test_minify_failure() {
        let set = ResourceSet::builder("app.js", ResourceType::Script)
            .resources(embedded(&[("/a.js", "function (")]))
            .minifier(Arc::new(JsMinifier::default()))
            .build()
            .unwrap();

        let err = build(&set, &[], false).err().unwrap();
        assert!(matches!(err, ProcessError::MinificationFailure { .. }));

        let out = build(&set, &[], true).unwrap();
        assert_eq!(out.content, "function (");
    }

    #[test]
    fn test_unavailable_resource() {
        let source = Arc::new(EmbeddedSource::new());
        let set = ResourceSet::builder("app.js", ResourceType::Script)
            .resource(Resource::new("/missing.js", ResourceMode::Embedded, source))
            .build()
            .unwrap();
        let err = build(&set, &[], false).err().unwrap();
        assert!(err.is_retryable());
    }
}
