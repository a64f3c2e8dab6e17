//! Engine configuration from `combiner.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── capability   # [minifiers.*], [filters.*], [cache_vary.*]
//! ├── error        # ConfigError, ConfigDiagnostics
//! ├── section      # [engine], [serve]
//! └── mod.rs       # CombinerConfig (this file), [[sets]]
//! ```
//!
//! # Sections
//!
//! | Section              | Purpose                                        |
//! |----------------------|------------------------------------------------|
//! | `[engine]`           | Route prefix, base directory, freshness, caching |
//! | `[serve]`            | HTTP front-end (interface, port, watch)        |
//! | `[minifiers.<name>]` | Named minifier with typed parameters           |
//! | `[filters.<name>]`   | Named content filter, optionally set-restricted |
//! | `[cache_vary.<name>]`| Named cache-vary provider                      |
//! | `[[sets]]`           | Resource set definitions                       |
//!
//! All capability references are resolved once in [`CombinerConfig::into_engine`];
//! the resulting engine never looks anything up by name per request.

mod capability;
mod error;
mod section;

pub use capability::{FilterKind, FilterSpec, MinifierSpec, VarySpec};
pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError};
pub use section::{EngineSection, ServeSection};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::compress::{Compressor, DeflateCompressor, Encoding, GzipCompressor, IdentityCompressor};
use crate::log;
use crate::resource::{
    EmbeddedSource, FetchSource, FileSource, HttpFetcher, Resource, ResourceMode, ResourceSource,
};
use crate::set::{ResourceSet, ResourceType, SetRegistry};
use crate::workflow::Engine;

/// Default config file name.
pub const CONFIG_FILE: &str = "combiner.toml";

// ============================================================================
// root configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Directory containing the config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    pub engine: EngineSection,
    pub serve: ServeSection,
    pub minifiers: BTreeMap<String, MinifierSpec>,
    pub filters: BTreeMap<String, FilterSpec>,
    pub cache_vary: BTreeMap<String, VarySpec>,
    pub sets: Vec<SetSection>,
}

/// One `[[sets]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSection {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ResourceType,
    /// Named `[minifiers.*]` entry or built-in kind.
    #[serde(default)]
    pub minifier: Option<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub cache_vary: Vec<String>,
    /// Overrides `engine.compressors`.
    #[serde(default)]
    pub compressors: Option<Vec<Encoding>>,
    /// Seconds; overrides `engine.max_age`.
    #[serde(default)]
    pub max_age: Option<u64>,
    #[serde(default)]
    pub debug_enabled: Option<bool>,
    #[serde(default)]
    pub ignore_pipeline_when_debug: Option<bool>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub path: String,
    /// Inferred when absent: `http(s)://` paths are remote, others static.
    #[serde(default)]
    pub mode: Option<ResourceMode>,
}

impl ResourceEntry {
    pub fn mode(&self) -> ResourceMode {
        self.mode.unwrap_or_else(|| {
            if is_absolute_url(&self.path) {
                ResourceMode::Remote
            } else {
                ResourceMode::Static
            }
        })
    }
}

fn is_absolute_url(path: &str) -> bool {
    url::Url::parse(path).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}

impl CombinerConfig {
    /// Load and parse a config file. Unknown fields are reported and ignored.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let (mut config, ignored) = Self::parse_with_ignored(&content)?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        config.root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(config)
    }

    /// Parse config from a string; the root stays empty (current directory).
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            log!("warning"; "- {}", field);
        }
    }

    /// Directory static resources resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.root.join(&self.engine.base_dir)
    }

    /// Resolve every set and capability binding into an engine.
    ///
    /// `embedded` backs resources declared with `mode = "embedded"`; the
    /// host registers their content before or after this call.
    pub fn into_engine(self, embedded: Arc<EmbeddedSource>) -> Result<Engine, ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        let mut sources = Sources::new(&self, embedded, &mut diag);

        let mut seen = FxHashSet::default();
        let mut sets = Vec::with_capacity(self.sets.len());
        for (i, section) in self.sets.iter().enumerate() {
            if !seen.insert(section.name.as_str()) {
                diag.error_with_hint(
                    format!("sets[{i}].name"),
                    format!("duplicate set name `{}`", section.name),
                    "set names must be unique",
                );
                continue;
            }
            if let Some(set) = self.build_set(i, section, &mut sources, &mut diag) {
                sets.push(set);
            }
        }
        self.check_filter_scopes(&seen, &mut diag);
        diag.into_result()?;

        let registry =
            SetRegistry::try_from(sets).map_err(|e| ConfigError::Validation(e.to_string()))?;
        log!("config"; "loaded {} set{}", registry.len(), if registry.len() == 1 { "" } else { "s" });
        Ok(Engine::new(self.engine.settings(), registry))
    }

    fn build_set(
        &self,
        i: usize,
        section: &SetSection,
        sources: &mut Sources,
        diag: &mut ConfigDiagnostics,
    ) -> Option<ResourceSet> {
        let field = |name: &str| format!("sets[{i}].{name}");
        let errors_before = diag.len();

        if section.name.trim().is_empty() {
            diag.error(field("name"), "set name is empty");
        }
        if section.resources.is_empty() {
            diag.error_with_hint(
                field("resources"),
                format!("set `{}` has no resources", section.name),
                "add at least one { path = \"...\" } entry",
            );
        }

        let mut builder = ResourceSet::builder(section.name.as_str(), section.ty).debug(
            section.debug_enabled.unwrap_or(self.engine.debug_enabled),
            section
                .ignore_pipeline_when_debug
                .unwrap_or(self.engine.ignore_pipeline_when_debug),
        );

        for (j, entry) in section.resources.iter().enumerate() {
            let mode = entry.mode();
            if mode == ResourceMode::Remote && !is_absolute_url(&entry.path) {
                diag.error(
                    field(&format!("resources[{j}].path")),
                    format!("remote resource `{}` is not an absolute http(s) URL", entry.path),
                );
                continue;
            }
            match sources.get(mode) {
                Ok(source) => builder = builder.resource(Resource::new(entry.path.as_str(), mode, source)),
                Err(message) => diag.error(field(&format!("resources[{j}].mode")), message),
            }
        }

        if let Some(name) = &section.minifier {
            match self.minifiers.get(name).cloned().or_else(|| MinifierSpec::builtin(name)) {
                Some(spec) => builder = builder.minifier(spec.build()),
                None => diag.error_with_hint(
                    field("minifier"),
                    format!("unknown minifier `{name}`"),
                    format!("define [minifiers.{name}] or use identity, js, css"),
                ),
            }
        }

        for name in &section.filters {
            let spec = self.filters.get(name).cloned().or_else(|| {
                FilterKind::builtin(name).map(|kind| FilterSpec {
                    kind,
                    sets: Vec::new(),
                })
            });
            match spec {
                Some(spec) => builder = builder.filter(spec.build()),
                None => diag.error_with_hint(
                    field("filters"),
                    format!("unknown filter `{name}`"),
                    format!("define [filters.{name}] or use fix_css_urls, css_variables, dedupe_charset"),
                ),
            }
        }

        for name in &section.cache_vary {
            let spec = self.cache_vary.get(name).cloned().or_else(|| {
                (name == "accept_language").then(|| VarySpec::AcceptLanguage {
                    default: "en".to_string(),
                    supported: Vec::new(),
                    append_to_url: true,
                })
            });
            match spec {
                Some(spec) => builder = builder.vary(spec.build(name)),
                None => diag.error_with_hint(
                    field("cache_vary"),
                    format!("unknown cache-vary provider `{name}`"),
                    format!("define [cache_vary.{name}]"),
                ),
            }
        }

        let encodings = section.compressors.as_ref().unwrap_or(&self.engine.compressors);
        builder = builder.compressors(compressors(encodings, self.engine.compression_level));

        if let Some(secs) = section.max_age {
            builder = builder.max_age(Duration::from_secs(secs));
        }

        if diag.len() > errors_before {
            return None;
        }
        match builder.build() {
            Ok(set) => Some(set),
            Err(e) => {
                diag.error(field("name"), e.to_string());
                None
            }
        }
    }

    /// Set restrictions on filters must name defined sets.
    fn check_filter_scopes(&self, sets: &FxHashSet<&str>, diag: &mut ConfigDiagnostics) {
        for (name, spec) in &self.filters {
            for set in spec.sets.iter().filter(|s| !sets.contains(s.as_str())) {
                diag.error(
                    format!("filters.{name}.sets"),
                    format!("filter `{name}` is restricted to unknown set `{set}`"),
                );
            }
        }
    }
}

fn compressors(encodings: &[Encoding], level: u32) -> Vec<Arc<dyn Compressor>> {
    encodings
        .iter()
        .map(|encoding| -> Arc<dyn Compressor> {
            match encoding {
                Encoding::Identity => Arc::new(IdentityCompressor),
                Encoding::Gzip => Arc::new(GzipCompressor { level }),
                Encoding::Deflate => Arc::new(DeflateCompressor { level }),
            }
        })
        .collect()
}

// ============================================================================
// resource sources
// ============================================================================

/// One shared source per mode; HTTP clients are created on first use.
struct Sources {
    files: Arc<FileSource>,
    embedded: Arc<EmbeddedSource>,
    timeout: Duration,
    origin: Option<url::Url>,
    remote: Option<Arc<dyn ResourceSource>>,
    dynamic: Option<Arc<dyn ResourceSource>>,
}

impl Sources {
    fn new(config: &CombinerConfig, embedded: Arc<EmbeddedSource>, diag: &mut ConfigDiagnostics) -> Self {
        let origin = config.engine.app_origin.as_deref().and_then(|origin| match url::Url::parse(origin) {
            Ok(url) => Some(url),
            Err(e) => {
                diag.error("engine.app_origin", format!("invalid origin `{origin}`: {e}"));
                None
            }
        });
        Self {
            files: Arc::new(FileSource::new(config.base_dir())),
            embedded,
            timeout: config.engine.remote_timeout(),
            origin,
            remote: None,
            dynamic: None,
        }
    }

    fn get(&mut self, mode: ResourceMode) -> Result<Arc<dyn ResourceSource>, String> {
        match mode {
            ResourceMode::Static => Ok(Arc::clone(&self.files) as Arc<dyn ResourceSource>),
            ResourceMode::Embedded => Ok(Arc::clone(&self.embedded) as Arc<dyn ResourceSource>),
            ResourceMode::Remote => {
                if self.remote.is_none() {
                    let fetcher = self.fetcher()?;
                    self.remote = Some(Arc::new(FetchSource::remote(Arc::new(fetcher), self.timeout)));
                }
                self.remote.clone().ok_or_else(|| "remote source unavailable".to_string())
            }
            ResourceMode::Dynamic => {
                if self.dynamic.is_none() {
                    let origin = self
                        .origin
                        .clone()
                        .ok_or_else(|| "dynamic resources need `engine.app_origin`".to_string())?;
                    let fetcher = self.fetcher()?.with_origin(origin);
                    self.dynamic = Some(Arc::new(FetchSource::dynamic(Arc::new(fetcher), self.timeout)));
                }
                self.dynamic.clone().ok_or_else(|| "dynamic source unavailable".to_string())
            }
        }
    }

    fn fetcher(&self) -> Result<HttpFetcher, String> {
        HttpFetcher::new(self.timeout).map_err(|e| format!("cannot create HTTP client: {e}"))
    }
}

// ============================================================================
// tests
// ============================================================================
