// src/watch/patterns.rs

//! Decides which filesystem events are worth a rebuild.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{KilnError, Result};
use crate::fs::absolutize;
use crate::watch::event::{WatchEvent, WatchOp};

/// Suffix editors use for backup files.
const BACKUP_SUFFIX: &str = "~";

/// Compile `ignore` globs (relative to the source dir) into one set.
pub fn compile_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            KilnError::ConfigError(format!("invalid ignore pattern {pattern:?}: {err}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| KilnError::ConfigError(format!("building ignore set: {err}")))
}

/// Filter applied to every event before it may trigger a rebuild.
///
/// Rejects:
/// - creates of editor backup files (`foo.txt~`),
/// - permission/metadata-only changes and plain accesses,
/// - anything under the target directory,
/// - paths matching one of the `ignore` globs.
#[derive(Clone)]
pub struct EventFilter {
    root: PathBuf,
    target_dir: PathBuf,
    ignore: GlobSet,
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("root", &self.root)
            .field("target_dir", &self.target_dir)
            .finish_non_exhaustive()
    }
}

impl EventFilter {
    pub fn new(source_dir: &Path, target_dir: &Path, ignore: &[String]) -> Result<Self> {
        Ok(Self {
            root: absolutize(source_dir),
            target_dir: absolutize(target_dir),
            ignore: compile_ignore_set(ignore)?,
        })
    }

    pub fn should_rebuild(&self, event: &WatchEvent) -> bool {
        match event.op {
            WatchOp::Chmod | WatchOp::Access => return false,
            WatchOp::Create if event.path.to_string_lossy().ends_with(BACKUP_SUFFIX) => {
                return false;
            }
            _ => {}
        }

        let path = absolutize(&event.path);
        if path.starts_with(&self.target_dir) {
            return false;
        }

        match self.relative(&path) {
            Some(rel) => !self.ignore.is_match(rel),
            None => true,
        }
    }

    /// First event in a `notify` event that passes the filter.
    pub fn first_qualifying(&self, event: &notify::Event) -> Option<WatchEvent> {
        WatchEvent::from_notify(event)
            .into_iter()
            .find(|e| self.should_rebuild(e))
    }

    /// `path` relative to the root, with forward slashes.
    fn relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
    }
}
