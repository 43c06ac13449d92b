// src/watch/watcher.rs

use std::path::PathBuf;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn, Dispatch};

use crate::errors::Result;
use crate::watch::coalesce::coalesce_events;
use crate::watch::patterns::EventFilter;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Watch `root` recursively and send a rebuild request on `rebuild` for
/// every qualifying burst of changes.
///
/// After each request the watcher waits for a message on `rebuild_done`
/// before it will send another one.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    filter: EventFilter,
    rebuild: mpsc::Sender<()>,
    rebuild_done: mpsc::Receiver<()>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

    // notify calls back on its own thread, outside any subscriber scope.
    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if event_tx.send(res).is_err() {
                tracing::dispatcher::with_default(&dispatch, || {
                    warn!("watcher event loop gone; dropping filesystem event");
                });
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!("file watcher started on {:?}", root);

    tokio::spawn(
        coalesce_events(event_rx, filter, rebuild, rebuild_done).with_current_subscriber(),
    );

    Ok(WatcherHandle {
        _inner: watcher,
        root,
    })
}
