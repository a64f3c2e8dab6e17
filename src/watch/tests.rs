use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;

use super::apply_changes;
use super::debouncer::{COOLDOWN, ChangeBatch, IDLE, QUIET};
use crate::freshness::normalize_path;
use crate::resource::{FileSource, Resource};
use crate::set::{ResourceSet, ResourceType, SetRegistry};
use crate::vary::RequestContext;
use crate::workflow::{Engine, Settings};

fn event(paths: Vec<PathBuf>, kind: notify::EventKind) -> notify::Event {
    notify::Event {
        kind,
        paths,
        attrs: Default::default(),
    }
}

fn write_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Data(
        notify::event::DataChange::Content,
    ))
}

fn touch_kind() -> notify::EventKind {
    notify::EventKind::Modify(notify::event::ModifyKind::Metadata(
        notify::event::MetadataKind::WriteTime,
    ))
}

fn file(dir: &TempDir, name: &str) -> PathBuf {
    normalize_path(dir.path()).join(name)
}

#[test]
fn test_empty_batch_idles() {
    let mut batch = ChangeBatch::new();
    let now = Instant::now();
    assert_eq!(batch.wait(now), IDLE);
    assert!(batch.flush(now + IDLE).is_none());
}

#[test]
fn test_metadata_and_editor_files_ignored() {
    let dir = TempDir::new().unwrap();
    let mut batch = ChangeBatch::new();
    let now = Instant::now();

    batch.record(&event(vec![file(&dir, "a.js")], touch_kind()), now);
    batch.record(
        &event(
            vec![file(&dir, ".a.js.swp"), file(&dir, "a.js~"), file(&dir, "a.tmp")],
            write_kind(),
        ),
        now,
    );
    assert_eq!(batch.wait(now), IDLE);
    assert!(batch.flush(now + QUIET).is_none());
}

#[test]
fn test_repeated_changes_flush_once() {
    let dir = TempDir::new().unwrap();
    let mut batch = ChangeBatch::new();
    let start = Instant::now();
    let a = file(&dir, "a.js");
    let b = file(&dir, "b.css");

    batch.record(&event(vec![a.clone()], notify::EventKind::Create(notify::event::CreateKind::File)), start);
    batch.record(&event(vec![a.clone(), b.clone()], write_kind()), start);
    batch.record(&event(vec![a.clone()], notify::EventKind::Remove(notify::event::RemoveKind::File)), start);

    assert_eq!(batch.flush(start + QUIET).unwrap(), vec![a, b]);
    assert!(batch.flush(start + QUIET).is_none());
}

#[test]
fn test_flush_waits_for_quiet_period() {
    let dir = TempDir::new().unwrap();
    let mut batch = ChangeBatch::new();
    let start = Instant::now();

    batch.record(&event(vec![file(&dir, "a.js")], write_kind()), start);
    let later = start + QUIET / 2;
    assert!(batch.flush(later).is_none());

    // A second write restarts the quiet period.
    batch.record(&event(vec![file(&dir, "a.js")], write_kind()), later);
    assert!(batch.flush(start + QUIET).is_none());
    assert_eq!(batch.wait(start + QUIET), QUIET / 2);
    assert!(batch.flush(later + QUIET).is_some());
}

#[test]
fn test_cooldown_delays_next_flush() {
    let dir = TempDir::new().unwrap();
    let mut batch = ChangeBatch::new();
    let start = Instant::now();

    batch.record(&event(vec![file(&dir, "a.js")], write_kind()), start);
    let first = start + QUIET;
    assert!(batch.flush(first).is_some());

    batch.record(&event(vec![file(&dir, "b.js")], write_kind()), first);
    assert_eq!(batch.wait(first + QUIET), COOLDOWN - QUIET);
    assert!(batch.flush(first + QUIET).is_none());
    assert_eq!(batch.flush(first + COOLDOWN).unwrap(), vec![file(&dir, "b.js")]);
    assert_eq!(batch.wait(first + COOLDOWN), IDLE);
}

#[test]
fn test_apply_changes_invalidates_containing_sets() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.js"), "var a=1;").unwrap();
    std::fs::write(dir.path().join("b.css"), "b{}").unwrap();
    let source = Arc::new(FileSource::new(dir.path()));

    let js = ResourceSet::builder("app.js", ResourceType::Script)
        .resource(Resource::file("~/a.js", Arc::clone(&source)))
        .build()
        .unwrap();
    let css = ResourceSet::builder("site.css", ResourceType::Stylesheet)
        .resource(Resource::file("~/b.css", Arc::clone(&source)))
        .build()
        .unwrap();
    let settings = Settings {
        freshness_interval: None,
        ..Settings::default()
    };
    let engine = Engine::new(settings, SetRegistry::try_from(vec![js, css]).unwrap());
    let cx = RequestContext::new();
    let old = engine.current_version("app.js", &cx).unwrap();
    engine.current_version("site.css", &cx).unwrap();

    assert_eq!(engine.watch_roots(), vec![dir.path().to_path_buf()]);

    std::fs::write(dir.path().join("a.js"), "var a=2;").unwrap();
    let paths = vec![file(&dir, "a.js"), file(&dir, "unrelated.txt")];

    assert_eq!(apply_changes(&engine, paths), vec!["app.js"]);
    assert_eq!(engine.stats().invalidations, 1);
    assert_ne!(engine.current_version("app.js", &cx).unwrap(), old);
}
