//! The processing workflow: turns a set name, version and request into a
//! served artifact, a debug listing, or a classified error.
//!
//! # Stages
//!
//! ```text
//! resolve ──► debug bypass? ──► vary states ──► pull check ──► cache lookup
//!                  │                                               │ miss
//!                  ▼                                               ▼
//!           DebugListing          processed build (guarded) ──► version check
//!                                                                  │
//!                                          compress (guarded) ◄────┘
//!                                                  │
//!                                                  ▼
//!                                        store ──► Served artifact
//! ```
//!
//! Builds are deduplicated per (set, vary) and compressions per cache key,
//! so a cold cache hit by many requests builds once. Every set carries an
//! invalidation generation: a build that started before an invalidation is
//! returned to its caller but never stored.

mod build;
mod debug;
mod error;
mod settings;
mod stats;
pub mod url;

pub use debug::{DebugListing, DebugResource};
pub use error::ProcessError;
pub use settings::Settings;
pub use stats::StatsSnapshot;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::cache::{
    Artifact, ArtifactCache, BuildGuards, CacheKey, MemoryCache, ProcessedContent, ProcessedKey,
    ProcessedStore,
};
use crate::compress::{Compressor, Encoding, negotiate};
use crate::freshness::FingerprintCache;
use crate::resource::ResourceMode;
use crate::set::{ResourceSet, SetRegistry};
use crate::vary::{CacheVaryState, CompoundVaryKey, RequestContext, collect_states, url_suffix};
use crate::{debug, log};
use stats::Stats;

/// A request for a combined set.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    pub set: String,
    pub version: String,
    pub context: RequestContext,
    pub accept_encoding: String,
}

impl ProcessRequest {
    pub fn new(set: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            set: set.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn accept_encoding(mut self, accept_encoding: impl Into<String>) -> Self {
        self.accept_encoding = accept_encoding.into();
        self
    }
}

/// An artifact plus the caching policy for its response.
#[derive(Debug, Clone)]
pub struct Served {
    pub artifact: Arc<Artifact>,
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Artifact(Served),
    Debug(DebugListing),
}

pub struct Engine {
    settings: Settings,
    sets: SetRegistry,
    cache: Arc<dyn ArtifactCache>,
    processed: ProcessedStore,
    fingerprints: FingerprintCache,
    build_guards: BuildGuards<ProcessedKey>,
    compress_guards: BuildGuards<CacheKey>,
    generations: RwLock<FxHashMap<String, u64>>,
    last_checked: DashMap<String, Instant>,
    stats: Stats,
}

impl Engine {
    pub fn new(settings: Settings, sets: SetRegistry) -> Self {
        Self::with_cache(settings, sets, Arc::new(MemoryCache::new()))
    }

    pub fn with_cache(settings: Settings, sets: SetRegistry, cache: Arc<dyn ArtifactCache>) -> Self {
        Self {
            settings,
            sets,
            cache,
            processed: ProcessedStore::new(),
            fingerprints: FingerprintCache::new(),
            build_guards: BuildGuards::new(),
            compress_guards: BuildGuards::new(),
            generations: RwLock::new(FxHashMap::default()),
            last_checked: DashMap::new(),
            stats: Stats::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sets(&self) -> &SetRegistry {
        &self.sets
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            variants: self.processed.len(),
            ..self.stats.snapshot()
        }
    }

    // ========================================================================
    // Process
    // ========================================================================

    pub fn process(&self, request: &ProcessRequest) -> Result<Outcome, ProcessError> {
        let set = self.resolve(&request.set)?;
        if set.is_pipeline_bypassed() {
            debug!("serve"; "{}: debug listing", set.name());
            return debug::listing(set).map(Outcome::Debug);
        }

        let states = collect_states(set.vary_providers(), &request.context);
        let vary = CompoundVaryKey::from_states(&states);
        self.check_freshness(set);

        let compressor = negotiate(&request.accept_encoding, set.compressors());
        let key = CacheKey {
            set: set.name().to_string(),
            version: request.version.clone(),
            vary: vary.clone(),
            encoding: compressor.encoding(),
        };
        if let Some(artifact) = self.cache_get(&key) {
            self.stats.hit();
            debug!("lookup"; "{} [{}] hit ({})", set.name(), key.version, key.encoding);
            return Ok(Outcome::Artifact(self.served(set, artifact)));
        }
        self.stats.miss();
        debug!("lookup"; "{} [{}] miss ({})", set.name(), key.version, key.encoding);

        let processed = self.processed_content(set, &states, vary)?;
        if processed.version != request.version {
            return Err(ProcessError::VersionMismatch {
                set: set.name().to_string(),
                requested: request.version.clone(),
                current: processed.version.clone(),
            });
        }

        let artifact = self.compress(set, &processed, key, compressor.as_ref())?;
        Ok(Outcome::Artifact(self.served(set, artifact)))
    }

    /// Current version token of a set for a request.
    pub fn current_version(&self, name: &str, cx: &RequestContext) -> Result<String, ProcessError> {
        let set = self.resolve(name)?;
        if set.is_pipeline_bypassed() {
            return Err(ProcessError::PipelineBypassed(name.to_string()));
        }
        let states = collect_states(set.vary_providers(), cx);
        let vary = CompoundVaryKey::from_states(&states);
        self.check_freshness(set);
        Ok(self.processed_content(set, &states, vary)?.version.clone())
    }

    /// Public URL embedding the current version and URL-visible vary keys.
    pub fn resolve_url(&self, name: &str, cx: &RequestContext) -> Result<String, ProcessError> {
        let set = self.resolve(name)?;
        if set.is_pipeline_bypassed() {
            return Err(ProcessError::PipelineBypassed(name.to_string()));
        }
        let states = collect_states(set.vary_providers(), cx);
        let version = self.current_version(name, cx)?;
        Ok(url::combined_url(
            self.settings.url_prefix(),
            name,
            &version,
            &url_suffix(&states),
        ))
    }

    /// Individual resource URLs of a set, for pages rendered in debug mode.
    pub fn debug_listing(&self, name: &str) -> Result<DebugListing, ProcessError> {
        debug::listing(self.resolve(name)?)
    }

    fn resolve(&self, name: &str) -> Result<&Arc<ResourceSet>, ProcessError> {
        self.sets.get(name).ok_or_else(|| {
            debug!("resolve"; "unknown set `{name}`");
            ProcessError::ResourceSetNotFound(name.to_string())
        })
    }

    fn served(&self, set: &ResourceSet, artifact: Arc<Artifact>) -> Served {
        Served {
            artifact,
            max_age: set.max_age().unwrap_or(self.settings.max_age),
        }
    }

    // ========================================================================
    // Build and compress
    // ========================================================================

    fn processed_content(
        &self,
        set: &ResourceSet,
        states: &[CacheVaryState],
        vary: CompoundVaryKey,
    ) -> Result<Arc<ProcessedContent>, ProcessError> {
        let key = ProcessedKey {
            set: set.name().to_string(),
            vary,
        };
        if let Some(found) = self.processed.get(&key) {
            return Ok(found);
        }

        let _guard = self.build_guards.lock(key.clone());
        if let Some(found) = self.processed.get(&key) {
            return Ok(found);
        }

        let generation = self.generation(set.name());
        match build::build(set, states, self.settings.fail_open) {
            Ok(output) => {
                self.stats.build();
                let content = Arc::new(ProcessedContent {
                    content: Arc::from(output.content),
                    version: output.version,
                    fingerprints: output.fingerprints,
                    last_modified: output.last_modified,
                    built_at: SystemTime::now(),
                    generation,
                });
                self.store_processed(key, &content);
                Ok(content)
            }
            Err(ProcessError::ResourceUnavailable(e)) => match self.processed.stale(&key) {
                Some(stale) => {
                    log!("warning"; "{}: {e}, serving last good build [{}]", set.name(), stale.version);
                    self.stats.stale();
                    Ok(stale)
                }
                None => {
                    log!("error"; "{}: {e}", set.name());
                    Err(e.into())
                }
            },
            Err(e) => {
                log!("error"; "{e}");
                Err(e)
            }
        }
    }

    fn store_processed(&self, key: ProcessedKey, content: &Arc<ProcessedContent>) {
        let generations = self.generations.read();
        if generations.get(&key.set).copied().unwrap_or(0) != content.generation {
            debug!("build"; "{}: invalidated during build, not stored", key.set);
            return;
        }
        self.fingerprints
            .record(&key.set, content.fingerprints.clone());
        self.processed.put(key, Arc::clone(content));
    }

    fn compress(
        &self,
        set: &ResourceSet,
        processed: &ProcessedContent,
        key: CacheKey,
        compressor: &dyn Compressor,
    ) -> Result<Arc<Artifact>, ProcessError> {
        let _guard = self.compress_guards.lock(key.clone());
        if let Some(artifact) = self.cache_get(&key) {
            return Ok(artifact);
        }

        let body = processed.content.as_bytes();
        let (content, encoding) = match compressor.compress(body) {
            Ok(compressed) => (compressed, compressor.encoding()),
            Err(e) if self.settings.fail_open => {
                log!("warning"; "{}: {e}, serving identity", set.name());
                (body.to_vec(), Encoding::Identity)
            }
            Err(source) => {
                log!("error"; "{}: {source}", set.name());
                return Err(ProcessError::CompressionFailure {
                    set: set.name().to_string(),
                    source,
                });
            }
        };

        let artifact = Arc::new(Artifact {
            content: content.into(),
            version: processed.version.clone(),
            encoding,
            content_type: set.resource_type().content_type(),
            created_at: SystemTime::now(),
            last_modified: processed.last_modified,
        });
        if encoding == key.encoding {
            self.cache_put(key, &artifact, processed.generation);
        }
        Ok(artifact)
    }

    fn cache_get(&self, key: &CacheKey) -> Option<Arc<Artifact>> {
        self.cache.get(key).unwrap_or_else(|e| {
            log!("error"; "{e}");
            None
        })
    }

    fn cache_put(&self, key: CacheKey, artifact: &Arc<Artifact>, generation: u64) {
        let generations = self.generations.read();
        if generations.get(&key.set).copied().unwrap_or(0) != generation {
            return;
        }
        if let Err(e) = self.cache.put(key, Arc::clone(artifact)) {
            log!("error"; "{e}");
        }
    }

    fn generation(&self, set: &str) -> u64 {
        self.generations.read().get(set).copied().unwrap_or(0)
    }

    // ========================================================================
    // Freshness and invalidation
    // ========================================================================

    /// Pull check: compare recorded fingerprints against current content.
    fn check_freshness(&self, set: &ResourceSet) {
        let Some(interval) = self.settings.freshness_interval else {
            return;
        };
        let now = Instant::now();
        if !interval.is_zero()
            && let Some(last) = self.last_checked.get(set.name())
            && now.duration_since(*last) < interval
        {
            return;
        }
        self.last_checked.insert(set.name().to_string(), now);

        let Some(recorded) = self.fingerprints.get(set.name()) else {
            return;
        };
        let changed = recorded.len() != set.resources().len()
            || set
                .resources()
                .iter()
                .zip(&recorded)
                .any(|(resource, seen)| match resource.has_changed_since(seen.hash) {
                    Ok(changed) => changed,
                    Err(e) => {
                        debug!("lookup"; "{}: {e}", set.name());
                        true
                    }
                });
        if changed {
            debug!("lookup"; "{}: content changed", set.name());
            self.invalidate_set(set.name());
        }
    }

    /// Evict every cached variant of a set. Returns the number of artifacts
    /// evicted; unknown names are ignored.
    pub fn invalidate_set(&self, name: &str) -> usize {
        if self.sets.get(name).is_none() {
            return 0;
        }
        *self
            .generations
            .write()
            .entry(name.to_string())
            .or_default() += 1;

        self.processed.invalidate_set(name);
        self.fingerprints.forget(name);
        self.last_checked.remove(name);
        let evicted = self.cache.invalidate_set(name).unwrap_or_else(|e| {
            log!("error"; "{e}");
            0
        });
        self.stats.invalidation();
        log!("invalidate"; "{name} ({evicted} cached)");
        evicted
    }

    /// Evict every cached variant of every set.
    pub fn invalidate_all(&self) -> usize {
        {
            let mut generations = self.generations.write();
            for name in self.sets.names() {
                *generations.entry(name.to_string()).or_default() += 1;
            }
        }
        self.processed.invalidate_all();
        self.fingerprints.clear();
        self.last_checked.clear();
        let evicted = self.cache.invalidate_all().unwrap_or_else(|e| {
            log!("error"; "{e}");
            0
        });
        self.stats.invalidation();
        log!("invalidate"; "all sets ({evicted} cached)");
        evicted
    }

    /// Invalidate every set depending on a changed file. Returns their names.
    pub fn invalidate_path(&self, path: &Path) -> Vec<String> {
        let mut names: FxHashSet<String> = self.fingerprints.sets_watching(path).into_iter().collect();
        names.extend(
            self.sets
                .containing(path)
                .into_iter()
                .map(|set| set.name().to_string()),
        );

        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        for name in &names {
            self.invalidate_set(name);
        }
        names
    }

    /// Directories holding the static resources of every set.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self
            .sets
            .iter()
            .flat_map(|set| set.resources().iter())
            .filter(|r| r.mode() == ResourceMode::Static)
            .filter_map(|r| r.local_path())
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{EmbeddedSource, Resource};
    use crate::set::ResourceType;

    fn engine(source: &Arc<EmbeddedSource>) -> Engine {
        source.insert("/a.js", b"var a=1;".as_slice());
        source.insert("/b.js", b"var b=2;".as_slice());
        let set = ResourceSet::builder("app.js", ResourceType::Script)
            .resource(Resource::new("/a.js", ResourceMode::Embedded, source.clone()))
            .resource(Resource::new("/b.js", ResourceMode::Embedded, source.clone()))
            .build()
            .unwrap();
        Engine::new(Settings::default(), SetRegistry::try_from(vec![set]).unwrap())
    }

    fn body(outcome: Outcome) -> Vec<u8> {
        match outcome {
            Outcome::Artifact(served) => served.artifact.content.to_vec(),
            Outcome::Debug(_) => panic!("expected artifact"),
        }
    }

    #[test]
    fn test_process_hit_after_miss() {
        let source = Arc::new(EmbeddedSource::new());
        let engine = engine(&source);
        let version = engine.current_version("app.js", &RequestContext::new()).unwrap();

        let request = ProcessRequest::new("app.js", &version);
        assert_eq!(body(engine.process(&request).unwrap()), b"var a=1;var b=2;");
        assert_eq!(body(engine.process(&request).unwrap()), b"var a=1;var b=2;");

        let stats = engine.stats();
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_pull_check_detects_change() {
        let source = Arc::new(EmbeddedSource::new());
        let engine = engine(&source);
        let cx = RequestContext::new();
        let old = engine.current_version("app.js", &cx).unwrap();

        source.insert("/a.js", b"var a=2;".as_slice());
        let new = engine.current_version("app.js", &cx).unwrap();
        assert_ne!(old, new);
        assert_eq!(engine.stats().invalidations, 1);
    }

    #[test]
    fn test_pull_checks_disabled() {
        let source = Arc::new(EmbeddedSource::new());
        let mut engine = engine(&source);
        engine.settings.freshness_interval = None;
        let cx = RequestContext::new();
        let old = engine.current_version("app.js", &cx).unwrap();

        source.insert("/a.js", b"var a=2;".as_slice());
        assert_eq!(engine.current_version("app.js", &cx).unwrap(), old);

        engine.invalidate_set("app.js");
        assert_ne!(engine.current_version("app.js", &cx).unwrap(), old);
    }

    #[test]
    fn test_stale_copy_served_when_unavailable() {
        let source = Arc::new(EmbeddedSource::new());
        let mut engine = engine(&source);
        engine.settings.freshness_interval = None;
        let cx = RequestContext::new();
        let version = engine.current_version("app.js", &cx).unwrap();

        source.remove("/a.js");
        engine.invalidate_set("app.js");

        assert_eq!(engine.current_version("app.js", &cx).unwrap(), version);
        assert_eq!(engine.stats().stale_served, 1);

        source.insert("/a.js", b"var a=3;".as_slice());
        assert_ne!(engine.current_version("app.js", &cx).unwrap(), version);
    }

    #[test]
    fn test_unknown_set_and_invalidate() {
        let source = Arc::new(EmbeddedSource::new());
        let engine = engine(&source);
        let err = engine
            .process(&ProcessRequest::new("nope.js", "v"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::ResourceSetNotFound(_)));
        assert_eq!(engine.invalidate_set("nope.js"), 0);
        assert_eq!(engine.stats().misses, 0);
    }

    #[test]
    fn test_invalidate_all_rebuilds_and_keeps_stale() {
        let source = Arc::new(EmbeddedSource::new());
        let mut engine = engine(&source);
        engine.settings.freshness_interval = None;
        let cx = RequestContext::new();
        let version = engine.current_version("app.js", &cx).unwrap();
        engine.process(&ProcessRequest::new("app.js", &version)).unwrap();
        assert_eq!(engine.stats().variants, 1);

        assert_eq!(engine.invalidate_all(), 1);
        assert_eq!(engine.stats().variants, 0);

        source.remove("/b.js");
        assert_eq!(engine.current_version("app.js", &cx).unwrap(), version);
        assert_eq!(engine.stats().stale_served, 1);

        source.insert("/b.js", b"var b=3;".as_slice());
        engine.invalidate_all();
        assert_ne!(engine.current_version("app.js", &cx).unwrap(), version);
        assert_eq!(engine.stats().builds, 2);
    }

    #[test]
    fn test_resolve_url() {
        let source = Arc::new(EmbeddedSource::new());
        let engine = engine(&source);
        let cx = RequestContext::new();
        let version = engine.current_version("app.js", &cx).unwrap();
        assert_eq!(
            engine.resolve_url("app.js", &cx).unwrap(),
            format!("/combres/app.js/{version}/")
        );
    }
}
