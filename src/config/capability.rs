//! Named capability bindings: `[minifiers.<name>]`, `[filters.<name>]` and
//! `[cache_vary.<name>]`, each a `kind` plus that kind's typed parameters.
//!
//! Sets refer to bindings by name. Built-in kinds can also be referenced
//! directly (`minifier = "js"`) with default parameters.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::filter::css::{CssVariables, DedupeCharset, FixCssUrls};
use crate::filter::{ContentFilter, FilterBinding};
use crate::minify::{CssMinifier, JsMinifier, Minifier, NullMinifier};
use crate::vary::{AcceptLanguageVary, CacheVaryProvider, HEADER_DEFAULT_KEY, HeaderVary};

const fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MinifierSpec {
    Identity,
    Js {
        #[serde(default = "yes")]
        mangle: bool,
        #[serde(default = "yes")]
        compress: bool,
    },
    Css,
}

impl MinifierSpec {
    /// Built-in kind referenced by name, with default parameters.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "identity" | "none" => Some(Self::Identity),
            "js" => Some(Self::Js {
                mangle: true,
                compress: true,
            }),
            "css" => Some(Self::Css),
            _ => None,
        }
    }

    pub fn build(&self) -> Arc<dyn Minifier> {
        match *self {
            Self::Identity => Arc::new(NullMinifier),
            Self::Js { mangle, compress } => Arc::new(JsMinifier { mangle, compress }),
            Self::Css => Arc::new(CssMinifier),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    FixCssUrls,
    CssVariables,
    DedupeCharset,
}

impl FilterKind {
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "fix_css_urls" => Some(Self::FixCssUrls),
            "css_variables" => Some(Self::CssVariables),
            "dedupe_charset" => Some(Self::DedupeCharset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    /// Restrict the filter to these sets; empty means every referencing set.
    #[serde(default)]
    pub sets: Vec<String>,
}

impl FilterSpec {
    pub fn build(&self) -> FilterBinding {
        let filter = match self.kind {
            FilterKind::FixCssUrls => ContentFilter::single(FixCssUrls),
            FilterKind::CssVariables => ContentFilter::single(CssVariables),
            FilterKind::DedupeCharset => ContentFilter::combined(DedupeCharset),
        };
        let binding = FilterBinding::new(filter);
        if self.sets.is_empty() {
            binding
        } else {
            binding.only_for(self.sets.iter().cloned())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VarySpec {
    AcceptLanguage {
        #[serde(default = "default_language")]
        default: String,
        #[serde(default)]
        supported: Vec<String>,
        #[serde(default = "yes")]
        append_to_url: bool,
    },
    Header {
        header: String,
        /// Allowed values; anything else maps to `default`.
        #[serde(default)]
        values: Vec<String>,
        #[serde(default = "default_header_key")]
        default: String,
    },
}

fn default_header_key() -> String {
    HEADER_DEFAULT_KEY.to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl VarySpec {
    /// `name` becomes the provider's key in the compound vary key.
    pub fn build(&self, name: &str) -> Arc<dyn CacheVaryProvider> {
        match self {
            Self::AcceptLanguage {
                default,
                supported,
                append_to_url,
            } => {
                let vary = AcceptLanguageVary::new(default.as_str(), supported.iter().cloned());
                Arc::new(if *append_to_url { vary } else { vary.hidden() })
            }
            Self::Header {
                header,
                values,
                default,
            } => Arc::new(
                HeaderVary::new(name, header.as_str(), values.iter().cloned())
                    .with_default(default.as_str()),
            ),
        }
    }
}
