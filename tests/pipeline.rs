//! End-to-end behavior of the processing workflow.

use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::{Arc, Barrier};
use std::thread;

use combiner::compress::{Compressor, GzipCompressor, IdentityCompressor};
use combiner::filter::ContentFilter;
use combiner::filter::css::DedupeCharset;
use combiner::resource::{EmbeddedSource, Resource, ResourceMode};
use combiner::set::{ResourceSet, ResourceType, SetRegistry};
use combiner::vary::{AcceptLanguageVary, HeaderVary, RequestContext};
use combiner::workflow::Served;
use combiner::{Engine, Outcome, ProcessError, ProcessRequest, Settings};

fn embedded(source: &Arc<EmbeddedSource>, path: &str) -> Resource {
    Resource::new(path, ResourceMode::Embedded, source.clone())
}

fn script_set(name: &str, source: &Arc<EmbeddedSource>, paths: &[&str]) -> ResourceSet {
    ResourceSet::builder(name, ResourceType::Script)
        .resources(paths.iter().map(|p| embedded(source, p)))
        .compressors(vec![
            Arc::new(GzipCompressor::default()) as Arc<dyn Compressor>,
            Arc::new(IdentityCompressor),
        ])
        .build()
        .unwrap()
}

fn engine(sets: Vec<ResourceSet>) -> Engine {
    Engine::new(Settings::default(), SetRegistry::try_from(sets).unwrap())
}

fn served(engine: &Engine, set: &str, version: &str, accept: &str) -> Served {
    let request = ProcessRequest::new(set, version).accept_encoding(accept);
    match engine.process(&request).unwrap() {
        Outcome::Artifact(served) => served,
        Outcome::Debug(_) => panic!("expected artifact for {set}"),
    }
}

fn current(engine: &Engine, set: &str) -> String {
    engine.current_version(set, &RequestContext::new()).unwrap()
}

#[test]
fn test_resources_combined_in_declared_order() {
    let source = Arc::new(
        EmbeddedSource::new()
            .with("c.js", b"var c=3;".to_vec())
            .with("a.js", b"var a=1;".to_vec())
            .with("b.js", b"var b=2;".to_vec()),
    );
    let engine = engine(vec![script_set("app.js", &source, &["c.js", "a.js", "b.js"])]);

    let version = current(&engine, "app.js");
    let served = served(&engine, "app.js", &version, "identity");
    assert_eq!(&*served.artifact.content, b"var c=3;var a=1;var b=2;");
}

#[test]
fn test_repeated_requests_are_identical() {
    let source = Arc::new(
        EmbeddedSource::new()
            .with("a.js", b"var a=1;".to_vec())
            .with("b.js", b"var b=2;".to_vec()),
    );
    let engine = engine(vec![script_set("app.js", &source, &["a.js", "b.js"])]);
    let version = current(&engine, "app.js");
    assert_eq!(current(&engine, "app.js"), version);

    let first = served(&engine, "app.js", &version, "gzip");
    let second = served(&engine, "app.js", &version, "gzip");
    assert_eq!(first.artifact.content, second.artifact.content);

    let identity = served(&engine, "app.js", &version, "identity");
    assert_eq!(first.artifact.version, identity.artifact.version);

    let mut decoded = Vec::new();
    GzDecoder::new(&*first.artifact.content)
        .read_to_end(&mut decoded)
        .unwrap();
    assert_eq!(decoded, &*identity.artifact.content);

    // One processed build serves both encodings.
    assert_eq!(engine.stats().builds, 1);
}

#[test]
fn test_invalidation_is_isolated_per_set() {
    let source = Arc::new(
        EmbeddedSource::new()
            .with("a.js", b"var a=1;".to_vec())
            .with("b.js", b"var b=2;".to_vec()),
    );
    let engine = engine(vec![
        script_set("a.js", &source, &["a.js"]),
        script_set("b.js", &source, &["b.js"]),
    ]);
    let a = current(&engine, "a.js");
    let b = current(&engine, "b.js");
    served(&engine, "a.js", &a, "identity");
    served(&engine, "b.js", &b, "identity");
    let before = engine.stats();

    assert_eq!(engine.invalidate_set("a.js"), 1);

    served(&engine, "b.js", &b, "identity");
    let after = engine.stats();
    assert_eq!(after.hits, before.hits + 1);
    assert_eq!(after.builds, before.builds);

    served(&engine, "a.js", &a, "identity");
    assert_eq!(engine.stats().builds, before.builds + 1);
}

#[test]
fn test_invalidation_evicts_every_variant() {
    let source = Arc::new(
        EmbeddedSource::new()
            .with("site.css", b"body{}".to_vec())
            .with("a.js", b"var a=1;".to_vec()),
    );
    let set = ResourceSet::builder("site.css", ResourceType::Stylesheet)
        .resource(embedded(&source, "site.css"))
        .vary(Arc::new(AcceptLanguageVary::new("en", ["en", "fr"])))
        .compressors(vec![
            Arc::new(GzipCompressor::default()) as Arc<dyn Compressor>,
            Arc::new(IdentityCompressor),
        ])
        .build()
        .unwrap();
    let engine = engine(vec![set, script_set("app.js", &source, &["a.js"])]);
    let app = current(&engine, "app.js");
    served(&engine, "app.js", &app, "identity");

    let serve_all = || {
        for lang in ["en", "fr"] {
            let cx = RequestContext::new().with_header("Accept-Language", lang);
            let version = engine.current_version("site.css", &cx).unwrap();
            for accept in ["gzip", "identity"] {
                let request = ProcessRequest::new("site.css", version.as_str())
                    .context(cx.clone())
                    .accept_encoding(accept);
                let Outcome::Artifact(served) = engine.process(&request).unwrap() else {
                    panic!("expected artifact");
                };
                assert_eq!(served.artifact.encoding.as_str(), accept);
            }
        }
    };

    serve_all();
    let before = engine.stats();
    assert_eq!(before.variants, 3);

    assert_eq!(engine.invalidate_set("site.css"), 4);
    assert_eq!(engine.stats().variants, 1);

    serve_all();
    let after = engine.stats();
    assert_eq!(after.misses, before.misses + 4);
    assert_eq!(after.hits, before.hits);
    assert_eq!(after.builds, before.builds + 2);

    // The other set kept its artifact.
    served(&engine, "app.js", &app, "identity");
    assert_eq!(engine.stats().hits, after.hits + 1);
}

#[test]
fn test_header_values_bound_cached_variants() {
    let source = Arc::new(EmbeddedSource::new().with("a.js", b"var a=1;".to_vec()));
    let set = ResourceSet::builder("app.js", ResourceType::Script)
        .resource(embedded(&source, "a.js"))
        .vary(Arc::new(
            HeaderVary::new("theme", "X-Theme", ["dark"]).with_default("light"),
        ))
        .build()
        .unwrap();
    let engine = engine(vec![set]);

    for i in 0..500 {
        let cx = RequestContext::new().with_header("X-Theme", format!("t{i}"));
        engine.current_version("app.js", &cx).unwrap();
    }
    let cx = RequestContext::new().with_header("X-Theme", "dark");
    engine.current_version("app.js", &cx).unwrap();

    let stats = engine.stats();
    assert_eq!(stats.builds, 2);
    assert_eq!(stats.variants, 2);
}

#[test]
fn test_concurrent_cold_requests_build_once() {
    const THREADS: usize = 50;

    let source = Arc::new(
        EmbeddedSource::new()
            .with("a.js", b"var a=1;".to_vec())
            .with("b.js", b"var b=2;".to_vec()),
    );
    let engine = engine(vec![script_set("app.js", &source, &["a.js", "b.js"])]);
    let barrier = Barrier::new(THREADS);

    let versions: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    current(&engine, "app.js")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(versions.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(engine.stats().builds, 1);
}

#[test]
fn test_concurrent_cold_process_compresses_once() {
    const THREADS: usize = 50;

    let source = Arc::new(EmbeddedSource::new().with("a.js", b"var a=1;".to_vec()));
    let engine = engine(vec![script_set("app.js", &source, &["a.js"])]);
    let version = current(&engine, "app.js");
    let barrier = Barrier::new(THREADS);

    let bodies: Vec<Arc<[u8]>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    served(&engine, "app.js", &version, "gzip").artifact.content.clone()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(engine.stats().builds, 1);
}

#[test]
fn test_debug_bypass_lists_untransformed_resources() {
    let source = Arc::new(
        EmbeddedSource::new()
            .with("/css/a.css", b"@charset \"utf-8\";\na{}".to_vec())
            .with("/css/b.css", b"@charset \"utf-8\";\nb{}".to_vec()),
    );
    let build = |name: &str, ignore_pipeline: bool| {
        ResourceSet::builder(name, ResourceType::Stylesheet)
            .resource(embedded(&source, "/css/a.css"))
            .resource(embedded(&source, "/css/b.css"))
            .filter(ContentFilter::combined(DedupeCharset))
            .debug(true, ignore_pipeline)
            .build()
            .unwrap()
    };
    let engine = engine(vec![build("bypass.css", true), build("full.css", false)]);

    let Outcome::Debug(listing) = engine
        .process(&ProcessRequest::new("bypass.css", ""))
        .unwrap()
    else {
        panic!("expected debug listing");
    };
    assert_eq!(listing.resources.len(), 2);
    assert_eq!(&*listing.resources[1].content, b"@charset \"utf-8\";\nb{}");
    assert!(listing.resources[0].url.starts_with("/css/a.css?"));
    assert!(matches!(
        engine.resolve_url("bypass.css", &RequestContext::new()),
        Err(ProcessError::PipelineBypassed(_))
    ));

    let version = current(&engine, "full.css");
    let full = served(&engine, "full.css", &version, "identity");
    let body = String::from_utf8(full.artifact.content.to_vec()).unwrap();
    assert_eq!(body.matches("@charset").count(), 1);
    assert!(body.starts_with("@charset"));
}

#[test]
fn test_unknown_set_touches_nothing() {
    let source = Arc::new(EmbeddedSource::new().with("a.js", b"var a=1;".to_vec()));
    let engine = engine(vec![script_set("app.js", &source, &["a.js"])]);

    let err = engine
        .process(&ProcessRequest::new("missing.js", "v1"))
        .unwrap_err();
    assert!(matches!(err, ProcessError::ResourceSetNotFound(ref name) if name == "missing.js"));
    assert_eq!(err.status_code(), 404);
    assert!(engine.resolve_url("missing.js", &RequestContext::new()).is_err());

    let stats = engine.stats();
    assert_eq!((stats.builds, stats.hits, stats.misses), (0, 0, 0));
}

#[test]
fn test_changed_resource_moves_version() {
    let source = Arc::new(
        EmbeddedSource::new()
            .with("a.js", b"var a=1;".to_vec())
            .with("b.js", b"var b=2;".to_vec()),
    );
    let engine = engine(vec![script_set("app.js", &source, &["a.js", "b.js"])]);

    let old = current(&engine, "app.js");
    let body = served(&engine, "app.js", &old, "identity");
    assert_eq!(&*body.artifact.content, b"var a=1;var b=2;");
    assert_eq!(body.artifact.encoding.as_str(), "identity");

    source.insert("a.js", b"var a=2;".to_vec());
    let err = engine
        .process(&ProcessRequest::new("app.js", old.as_str()).accept_encoding("identity"))
        .unwrap_err();
    let ProcessError::VersionMismatch { current: fresh, .. } = err else {
        panic!("expected version mismatch, got {err}");
    };
    assert_ne!(fresh, old);

    let body = served(&engine, "app.js", &fresh, "identity");
    assert_eq!(&*body.artifact.content, b"var a=2;var b=2;");
}
