//! Content filters applied before and after combination.
//!
//! The pipeline runs every [`SingleContentFilter`] on each resource's content
//! before concatenation, then every [`CombinedContentFilter`] on the result,
//! both in declared order. Filters must be pure functions of their inputs:
//! the version token is a hash of their output.

pub mod css;

use std::sync::Arc;
use thiserror::Error;

use crate::resource::Resource;
use crate::set::{ResourceSet, ResourceType};
use crate::vary::CacheVaryState;

/// Filter failure, reported as a server-side error for that build.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FilterError {
    pub message: String,
}

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Identity of a filter: its kind plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterInfo {
    kind: &'static str,
    params: Vec<(String, String)>,
}

impl FilterInfo {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Explicit inputs available to a filter.
pub struct FilterContext<'a> {
    pub set: &'a ResourceSet,
    /// Cache-vary states of the request being built.
    pub vary: &'a [CacheVaryState],
}

/// Transforms one resource's content before combination.
pub trait SingleContentFilter: Send + Sync {
    fn info(&self) -> FilterInfo;

    fn can_apply_to(&self, _ty: ResourceType) -> bool {
        true
    }

    fn transform(
        &self,
        cx: &FilterContext<'_>,
        resource: &Resource,
        content: String,
    ) -> Result<String, FilterError>;
}

/// Transforms the concatenated content of a set.
pub trait CombinedContentFilter: Send + Sync {
    fn info(&self) -> FilterInfo;

    fn can_apply_to(&self, _ty: ResourceType) -> bool {
        true
    }

    fn transform(
        &self,
        cx: &FilterContext<'_>,
        resources: &[Arc<Resource>],
        content: String,
    ) -> Result<String, FilterError>;
}

/// A filter of either stage.
#[derive(Clone)]
pub enum ContentFilter {
    Single(Arc<dyn SingleContentFilter>),
    Combined(Arc<dyn CombinedContentFilter>),
}

impl ContentFilter {
    pub fn single(filter: impl SingleContentFilter + 'static) -> Self {
        Self::Single(Arc::new(filter))
    }

    pub fn combined(filter: impl CombinedContentFilter + 'static) -> Self {
        Self::Combined(Arc::new(filter))
    }

    pub fn info(&self) -> FilterInfo {
        match self {
            Self::Single(f) => f.info(),
            Self::Combined(f) => f.info(),
        }
    }

    pub fn can_apply_to(&self, ty: ResourceType) -> bool {
        match self {
            Self::Single(f) => f.can_apply_to(ty),
            Self::Combined(f) => f.can_apply_to(ty),
        }
    }

    fn is_combined(&self) -> bool {
        matches!(self, Self::Combined(_))
    }
}

/// A filter plus an optional restriction to named sets.
#[derive(Clone)]
pub struct FilterBinding {
    filter: ContentFilter,
    set_names: Vec<String>,
}

impl FilterBinding {
    pub fn new(filter: ContentFilter) -> Self {
        Self {
            filter,
            set_names: Vec::new(),
        }
    }

    /// Only apply to the named sets.
    pub fn only_for(mut self, set_names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.set_names = set_names.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    pub fn applies_to(&self, set_name: &str, ty: ResourceType) -> bool {
        (self.set_names.is_empty() || self.set_names.iter().any(|n| n == set_name))
            && self.filter.can_apply_to(ty)
    }
}

impl From<ContentFilter> for FilterBinding {
    fn from(filter: ContentFilter) -> Self {
        Self::new(filter)
    }
}

impl PartialEq for FilterBinding {
    fn eq(&self, other: &Self) -> bool {
        self.filter.is_combined() == other.filter.is_combined()
            && self.filter.info() == other.filter.info()
            && self.set_names == other.set_names
    }
}

impl Eq for FilterBinding {}

// ============================================================================
// Pipeline helpers
// ============================================================================

/// Failure of a named filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFilter {
    pub kind: &'static str,
    pub error: FilterError,
}

/// Apply the set's single-resource filters to one resource.
pub fn apply_single(
    cx: &FilterContext<'_>,
    resource: &Resource,
    content: String,
) -> Result<String, FailedFilter> {
    cx.set.single_filters().try_fold(content, |content, filter| {
        filter
            .transform(cx, resource, content)
            .map_err(|error| FailedFilter {
                kind: filter.info().kind(),
                error,
            })
    })
}

/// Apply the set's combined filters to the concatenated content.
pub fn apply_combined(cx: &FilterContext<'_>, content: String) -> Result<String, FailedFilter> {
    let resources = cx.set.resources();
    cx.set.combined_filters().try_fold(content, |content, filter| {
        filter
            .transform(cx, resources, content)
            .map_err(|error| FailedFilter {
                kind: filter.info().kind(),
                error,
            })
    })
}
