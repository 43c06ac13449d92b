// crates/test-utils/src/builders.rs

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use kiln::Config;
use tempfile::TempDir;
use tracing::Dispatch;

use crate::test_dispatch;

/// Builder for `Config` to simplify test setup.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: Config {
                source_dir: source_dir.into(),
                target_dir: target_dir.into(),
                log: Some(test_dispatch()),
                ..Config::default()
            },
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.config.ignore.push(pattern.to_string());
        self
    }

    pub fn log(mut self, dispatch: Dispatch) -> Self {
        self.config.log = Some(dispatch);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// A throwaway `source/` + `public/` pair on the real filesystem.
pub struct TempSite {
    dir: TempDir,
}

impl TempSite {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("source")).expect("Failed to create source dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source(&self) -> PathBuf {
        self.dir.path().join("source")
    }

    pub fn target(&self) -> PathBuf {
        self.dir.path().join("public")
    }

    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new(self.source(), self.target())
    }

    /// Write a file under `source/`, creating parents.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.source().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write source file");
        path
    }

    /// Move a source file's modification time forward by `by`.
    pub fn touch(&self, rel: &str, by: Duration) {
        let path = self.source().join(rel);
        let current = fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::now());
        File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(current + by))
            .expect("Failed to set modification time");
    }

    pub fn read_target(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.target().join(rel)).ok()
    }
}

impl Default for TempSite {
    fn default() -> Self {
        Self::new()
    }
}
