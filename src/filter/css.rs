//! Built-in stylesheet filters.

use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::sync::{Arc, LazyLock};

use super::{
    CombinedContentFilter, FilterContext, FilterError, FilterInfo, SingleContentFilter,
};
use crate::resource::Resource;
use crate::set::ResourceType;

static CSS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*(['"]?)([^'")]+?)['"]?\s*\)"#).unwrap());

static DEFINE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@define\s*\{([^}]*)\}").unwrap());

static VARIABLE_USE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z_][\w-]*)").unwrap());

static CHARSET_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@charset\s+(?:"[^"]*"|'[^']*')\s*;\s*"#).unwrap());

// ============================================================================
// fix_css_urls
// ============================================================================

/// Rewrites relative `url(...)` references against the stylesheet's own
/// location so they survive being served from the combined URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixCssUrls;

impl SingleContentFilter for FixCssUrls {
    fn info(&self) -> FilterInfo {
        FilterInfo::new("fix_css_urls")
    }

    fn can_apply_to(&self, ty: ResourceType) -> bool {
        ty == ResourceType::Stylesheet
    }

    fn transform(
        &self,
        _cx: &FilterContext<'_>,
        resource: &Resource,
        content: String,
    ) -> Result<String, FilterError> {
        let base = resource.path();
        let remote = if resource.is_in_same_application() {
            None
        } else {
            Some(url::Url::parse(base).map_err(|e| {
                FilterError::new(format!("invalid stylesheet url `{base}`: {e}"))
            })?)
        };

        let rewritten = CSS_URL.replace_all(&content, |caps: &Captures| {
            let quote = &caps[1];
            let target = caps[2].trim();
            if !is_relative(target) {
                return caps[0].to_string();
            }
            let resolved = match &remote {
                Some(base) => base
                    .join(target)
                    .map(String::from)
                    .unwrap_or_else(|_| target.to_string()),
                None => resolve_local(base, target),
            };
            format!("url({quote}{resolved}{quote})")
        });
        Ok(rewritten.into_owned())
    }
}

fn is_relative(target: &str) -> bool {
    !(target.starts_with('/')
        || target.starts_with('#')
        || target.starts_with("data:")
        || target.contains("://"))
}

/// Join `target` onto the directory of `base`, collapsing `.` and `..`.
fn resolve_local(base: &str, target: &str) -> String {
    let base = base.trim_start_matches('~');
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();

    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

// ============================================================================
// css_variables
// ============================================================================

/// Substitutes `@name` uses with values from `@define { name: value; }`
/// blocks in the same stylesheet, then removes the blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssVariables;

impl SingleContentFilter for CssVariables {
    fn info(&self) -> FilterInfo {
        FilterInfo::new("css_variables")
    }

    fn can_apply_to(&self, ty: ResourceType) -> bool {
        ty == ResourceType::Stylesheet
    }

    fn transform(
        &self,
        _cx: &FilterContext<'_>,
        resource: &Resource,
        content: String,
    ) -> Result<String, FilterError> {
        let mut vars = FxHashMap::default();
        for block in DEFINE_BLOCK.captures_iter(&content) {
            for decl in block[1].split(';') {
                let decl = decl.trim();
                if decl.is_empty() {
                    continue;
                }
                let (name, value) = decl.split_once(':').ok_or_else(|| {
                    FilterError::new(format!(
                        "malformed @define entry `{decl}` in {}",
                        resource.path()
                    ))
                })?;
                vars.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
        if vars.is_empty() {
            return Ok(content);
        }

        let stripped = DEFINE_BLOCK.replace_all(&content, "");
        let substituted = VARIABLE_USE.replace_all(&stripped, |caps: &Captures| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(substituted.into_owned())
    }
}

// ============================================================================
// dedupe_charset
// ============================================================================

/// Keeps only the first `@charset` rule of the combined stylesheet and
/// moves it to the top, where browsers require it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DedupeCharset;

impl CombinedContentFilter for DedupeCharset {
    fn info(&self) -> FilterInfo {
        FilterInfo::new("dedupe_charset")
    }

    fn can_apply_to(&self, ty: ResourceType) -> bool {
        ty == ResourceType::Stylesheet
    }

    fn transform(
        &self,
        _cx: &FilterContext<'_>,
        _resources: &[Arc<Resource>],
        content: String,
    ) -> Result<String, FilterError> {
        let Some(first) = CHARSET_RULE.find(&content) else {
            return Ok(content);
        };
        let rule = first.as_str().trim_end().to_string();
        let rest = CHARSET_RULE.replace_all(&content, "");
        Ok(format!("{rule}\n{rest}"))
    }
}
