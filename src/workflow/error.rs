use thiserror::Error;

use crate::compress::CompressError;
use crate::filter::FilterError;
use crate::minify::MinifyError;
use crate::resource::ResourceError;

/// Failures of [`Engine::process`](super::Engine::process) and URL resolution.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("resource set `{0}` not found")]
    ResourceSetNotFound(String),

    #[error(transparent)]
    ResourceUnavailable(#[from] ResourceError),

    #[error("resource set `{set}` is at version {current}, not {requested}")]
    VersionMismatch {
        set: String,
        requested: String,
        current: String,
    },

    #[error("filter `{filter}` failed on `{set}`: {source}")]
    FilterFailure {
        set: String,
        filter: &'static str,
        #[source]
        source: FilterError,
    },

    #[error("minification of `{set}` failed: {source}")]
    MinificationFailure {
        set: String,
        #[source]
        source: MinifyError,
    },

    #[error("compression of `{set}` failed: {source}")]
    CompressionFailure {
        set: String,
        #[source]
        source: CompressError,
    },

    #[error("resource set `{0}` is served as individual resources in debug mode")]
    PipelineBypassed(String),
}

impl ProcessError {
    /// Transient failures a client may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::ResourceSetNotFound(_) => 404,
            Self::ResourceUnavailable(_) => 503,
            Self::VersionMismatch { .. } | Self::PipelineBypassed(_) => 409,
            Self::FilterFailure { .. }
            | Self::MinificationFailure { .. }
            | Self::CompressionFailure { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let unavailable = ProcessError::from(ResourceError::unavailable("/a.js", "gone"));
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status_code(), 503);

        let missing = ProcessError::ResourceSetNotFound("x.js".into());
        assert!(!missing.is_retryable());
        assert_eq!(missing.status_code(), 404);

        let mismatch = ProcessError::VersionMismatch {
            set: "app.js".into(),
            requested: "old".into(),
            current: "new".into(),
        };
        assert_eq!(mismatch.status_code(), 409);
        assert!(mismatch.to_string().contains("not old"));
    }
}
