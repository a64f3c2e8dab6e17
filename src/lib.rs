//! Combine, minify, compress and version sets of web resources behind a
//! single cacheable URL.
//!
//! A [`set::ResourceSet`] lists scripts or stylesheets in order. The
//! [`workflow::Engine`] reads them, runs the set's filters and minifier,
//! compresses the result for the client and caches it under a version
//! token derived from the content, so the URL changes whenever a resource
//! does.
//!
//! ```ignore
//! let config = CombinerConfig::load(Path::new("combiner.toml"))?;
//! let engine = config.into_engine(Arc::new(EmbeddedSource::new()))?;
//! let url = engine.resolve_url("app.js", &RequestContext::new())?;
//! ```

pub mod logger;

pub mod cache;
pub mod cli;
pub mod compress;
pub mod config;
pub mod filter;
pub mod freshness;
pub mod minify;
pub mod resource;
pub mod serve;
pub mod set;
pub mod utils;
pub mod vary;
pub mod watch;
pub mod workflow;

pub use config::{CombinerConfig, ConfigError};
pub use workflow::{Engine, Outcome, ProcessError, ProcessRequest, Settings};
