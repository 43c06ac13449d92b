// src/context/cache.rs

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tracing::{debug, error};

use crate::fs::FileSystem;

/// Remembers the last modification time seen for each path.
///
/// Lives for the whole build loop; entries are only ever updated, never
/// removed. Many jobs query it concurrently, so the map sits behind a single
/// lock while the stat itself happens outside of it.
#[derive(Debug)]
pub struct ChangeCache {
    fs: Arc<dyn FileSystem>,
    mod_times: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl ChangeCache {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            mod_times: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `path` is unchanged since the last time it was checked.
    ///
    /// Records the current modification time for the next check. Anything
    /// that prevents a confident answer (first sighting, missing file, stat
    /// failure) reports the path as changed.
    pub fn is_unchanged(&self, path: &Path) -> bool {
        let modified = match self.fs.modified(path) {
            Ok(t) => t,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return false,
            Err(err) => {
                error!(path = ?path, error = %err, "error stat'ing file; treating as changed");
                return false;
            }
        };

        let last = {
            let mut mod_times = self.mod_times.lock().unwrap_or_else(PoisonError::into_inner);
            let last = mod_times.get(path).copied();
            // The recorded time only ever moves forward.
            if last.is_none_or(|last| modified > last) {
                mod_times.insert(path.to_path_buf(), modified);
            }
            last
        };

        match last {
            None => false,
            Some(last) if last < modified => false,
            Some(_) => {
                debug!(path = ?path, "no changes to source");
                true
            }
        }
    }

    /// Number of paths seen so far.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.mod_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
