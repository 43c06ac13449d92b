// src/watch/event.rs

//! Watcher-agnostic view of a filesystem change.

use std::path::PathBuf;

use notify::event::{EventKind, ModifyKind};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Create,
    Write,
    Remove,
    Rename,
    /// Permission or other metadata-only change.
    Chmod,
    /// File was opened, read or closed without modification.
    Access,
    /// Backend couldn't classify the event.
    Other,
}

impl From<&EventKind> for WatchOp {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => WatchOp::Create,
            EventKind::Modify(ModifyKind::Metadata(_)) => WatchOp::Chmod,
            EventKind::Modify(ModifyKind::Name(_)) => WatchOp::Rename,
            EventKind::Modify(_) => WatchOp::Write,
            EventKind::Remove(_) => WatchOp::Remove,
            EventKind::Access(_) => WatchOp::Access,
            EventKind::Any | EventKind::Other => WatchOp::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub op: WatchOp,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, op: WatchOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Split a `notify` event into one event per affected path.
    pub fn from_notify(event: &notify::Event) -> Vec<WatchEvent> {
        let op = WatchOp::from(&event.kind);
        event
            .paths
            .iter()
            .map(|path| WatchEvent::new(path.clone(), op))
            .collect()
    }
}
