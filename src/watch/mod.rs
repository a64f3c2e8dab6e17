//! Push invalidation: watches the directories of static resources and
//! invalidates every set containing a changed file.
//!
//! ```text
//! notify → channel → ChangeBatch (quiet period, dedup) → Engine::invalidate_path
//! ```
//!
//! The watcher is optional. Without it, pull checks detect the same
//! changes on the next request.

mod debouncer;
mod roots;

#[cfg(test)]
mod tests;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use notify::RecommendedWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::workflow::Engine;
use crate::{debug, log};
use debouncer::ChangeBatch;
use roots::WatchRoots;

enum WatchMsg {
    Event(notify::Event),
    Stop,
}

/// Running watcher; stops when dropped or on [`WatchHandle::stop`].
pub struct WatchHandle {
    tx: Sender<WatchMsg>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(WatchMsg::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start watching the engine's static resource directories.
///
/// The watcher is attached before this returns, so no change made after
/// the call is missed.
pub fn spawn(engine: Arc<Engine>) -> notify::Result<WatchHandle> {
    let (tx, rx) = channel::unbounded();

    let event_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let _ = event_tx.send(WatchMsg::Event(event));
            }
            Err(e) => log!("watch"; "notify error: {}", e),
        }
    })?;

    let mut roots = WatchRoots::new(engine.watch_roots());
    roots.attach_existing(&mut watcher)?;
    log!("watch"; "watching {} director{}", roots.attached(), if roots.attached() == 1 { "y" } else { "ies" });

    let thread = thread::Builder::new()
        .name("combiner-watch".into())
        .spawn(move || run(rx, watcher, roots, &engine))
        .map_err(notify::Error::io)?;

    Ok(WatchHandle {
        tx,
        thread: Some(thread),
    })
}

fn run(rx: Receiver<WatchMsg>, mut watcher: RecommendedWatcher, mut roots: WatchRoots, engine: &Engine) {
    let mut batch = ChangeBatch::new();
    loop {
        match rx.recv_timeout(batch.wait(Instant::now())) {
            Ok(WatchMsg::Event(event)) => batch.record(&event, Instant::now()),
            Ok(WatchMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                roots.maintain(&mut watcher);
                if let Some(paths) = batch.flush(Instant::now()) {
                    apply_changes(engine, paths);
                }
            }
        }
    }
    debug!("watch"; "stopped");
}

/// Invalidate the sets containing any of `paths`; returns their names.
fn apply_changes(engine: &Engine, paths: Vec<PathBuf>) -> Vec<String> {
    let mut touched = Vec::new();
    for path in paths {
        let names = engine.invalidate_path(&path);
        if names.is_empty() {
            debug!("watch"; "{}: no set affected", path.display());
            continue;
        }
        log!("watch"; "{} → {}", path.display(), names.join(", "));
        touched.extend(names);
    }
    touched.sort();
    touched.dedup();
    touched
}
