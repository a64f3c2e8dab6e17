//! Resource sets: named, ordered groups of resources processed as one unit.
//!
//! A set is assembled once through [`ResourceSetBuilder`] and never mutated
//! afterwards; only the freshness state inside its resources changes.

mod registry;

pub use registry::SetRegistry;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::compress::{Compressor, GzipCompressor};
use crate::filter::{CombinedContentFilter, ContentFilter, FilterBinding, SingleContentFilter};
use crate::freshness::normalize_path;
use crate::minify::{Minifier, NullMinifier};
use crate::resource::Resource;
use crate::utils::mime::types;
use crate::vary::CacheVaryProvider;

/// Kind of content a set combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    #[serde(rename = "js", alias = "script")]
    Script,
    #[serde(rename = "css", alias = "stylesheet")]
    Stylesheet,
}

impl ResourceType {
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Script => types::JAVASCRIPT,
            Self::Stylesheet => types::CSS,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Script => "js",
            Self::Stylesheet => "css",
        }
    }
}

/// Errors raised while assembling sets.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetError {
    #[error("resource set name must not be empty")]
    EmptyName,

    #[error("resource set `{0}` has no resources")]
    NoResources(String),

    #[error("resource set `{0}` is defined more than once")]
    Duplicate(String),
}

/// A named, ordered group of resources plus its processing configuration.
pub struct ResourceSet {
    name: String,
    ty: ResourceType,
    debug_enabled: bool,
    ignore_pipeline_when_debug: bool,
    max_age: Option<Duration>,
    resources: Vec<Arc<Resource>>,
    filters: Vec<FilterBinding>,
    minifier: Arc<dyn Minifier>,
    compressors: Vec<Arc<dyn Compressor>>,
    vary_providers: Vec<Arc<dyn CacheVaryProvider>>,
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSet")
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("debug_enabled", &self.debug_enabled)
            .field("resources", &self.resources.len())
            .field("filters", &self.filters.len())
            .field("minifier", &self.minifier.info())
            .finish()
    }
}

impl ResourceSet {
    pub fn builder(name: impl Into<String>, ty: ResourceType) -> ResourceSetBuilder {
        ResourceSetBuilder::new(name, ty)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.ty
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled
    }

    pub fn ignore_pipeline_when_debug(&self) -> bool {
        self.ignore_pipeline_when_debug
    }

    /// Debug mode with the pipeline skipped entirely.
    pub fn is_pipeline_bypassed(&self) -> bool {
        self.debug_enabled && self.ignore_pipeline_when_debug
    }

    /// Per-set Cache-Control override.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    pub fn filters(&self) -> &[FilterBinding] {
        &self.filters
    }

    pub fn minifier(&self) -> &dyn Minifier {
        self.minifier.as_ref()
    }

    /// Compressors in preference order. Identity is always implied.
    pub fn compressors(&self) -> &[Arc<dyn Compressor>] {
        &self.compressors
    }

    pub fn vary_providers(&self) -> &[Arc<dyn CacheVaryProvider>] {
        &self.vary_providers
    }

    /// Single-resource filters that apply to this set, in declared order.
    pub fn single_filters(&self) -> impl Iterator<Item = &Arc<dyn SingleContentFilter>> {
        self.applicable_filters().filter_map(|f| match f {
            ContentFilter::Single(filter) => Some(filter),
            ContentFilter::Combined(_) => None,
        })
    }

    /// Combined-content filters that apply to this set, in declared order.
    pub fn combined_filters(&self) -> impl Iterator<Item = &Arc<dyn CombinedContentFilter>> {
        self.applicable_filters().filter_map(|f| match f {
            ContentFilter::Combined(filter) => Some(filter),
            ContentFilter::Single(_) => None,
        })
    }

    fn applicable_filters(&self) -> impl Iterator<Item = &ContentFilter> {
        self.filters
            .iter()
            .filter(|b| b.applies_to(&self.name, self.ty))
            .map(FilterBinding::filter)
    }

    /// Whether any static resource of this set is backed by `path`.
    pub fn contains_local_path(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.resources
            .iter()
            .filter_map(|r| r.local_path())
            .any(|local| normalize_path(&local) == path)
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct ResourceSetBuilder {
    name: String,
    ty: ResourceType,
    debug_enabled: bool,
    ignore_pipeline_when_debug: bool,
    max_age: Option<Duration>,
    resources: Vec<Arc<Resource>>,
    filters: Vec<FilterBinding>,
    minifier: Arc<dyn Minifier>,
    compressors: Option<Vec<Arc<dyn Compressor>>>,
    vary_providers: Vec<Arc<dyn CacheVaryProvider>>,
}

impl ResourceSetBuilder {
    fn new(name: impl Into<String>, ty: ResourceType) -> Self {
        Self {
            name: name.into(),
            ty,
            debug_enabled: false,
            ignore_pipeline_when_debug: false,
            max_age: None,
            resources: Vec::new(),
            filters: Vec::new(),
            minifier: Arc::new(NullMinifier),
            compressors: None,
            vary_providers: Vec::new(),
        }
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(Arc::new(resource));
        self
    }

    pub fn resources(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.resources.extend(resources.into_iter().map(Arc::new));
        self
    }

    /// Append a filter; a binding equal to one already present is ignored.
    pub fn filter(mut self, filter: impl Into<FilterBinding>) -> Self {
        let binding = filter.into();
        if !self.filters.contains(&binding) {
            self.filters.push(binding);
        }
        self
    }

    pub fn minifier(mut self, minifier: Arc<dyn Minifier>) -> Self {
        self.minifier = minifier;
        self
    }

    /// Replace the default compressor list (gzip).
    pub fn compressors(mut self, compressors: Vec<Arc<dyn Compressor>>) -> Self {
        self.compressors = Some(compressors);
        self
    }

    pub fn vary(mut self, provider: Arc<dyn CacheVaryProvider>) -> Self {
        self.vary_providers.push(provider);
        self
    }

    pub fn debug(mut self, enabled: bool, ignore_pipeline: bool) -> Self {
        self.debug_enabled = enabled;
        self.ignore_pipeline_when_debug = ignore_pipeline;
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn build(self) -> Result<ResourceSet, SetError> {
        if self.name.trim().is_empty() {
            return Err(SetError::EmptyName);
        }
        if self.resources.is_empty() {
            return Err(SetError::NoResources(self.name));
        }

        Ok(ResourceSet {
            name: self.name,
            ty: self.ty,
            debug_enabled: self.debug_enabled,
            ignore_pipeline_when_debug: self.ignore_pipeline_when_debug,
            max_age: self.max_age,
            resources: self.resources,
            filters: self.filters,
            minifier: self.minifier,
            compressors: self
                .compressors
                .unwrap_or_else(|| vec![Arc::new(GzipCompressor::default())]),
            vary_providers: self.vary_providers,
        })
    }
}
