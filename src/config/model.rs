// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::Dispatch;

/// Worker count used when none (or zero) is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

pub const DEFAULT_SOURCE_DIR: &str = ".";

pub const DEFAULT_TARGET_DIR: &str = "./public";

/// Runtime configuration for [`crate::build`] and [`crate::build_loop`].
///
/// Construct it directly, from a [`ConfigFile`], or via the CLI. Call
/// [`Config::with_defaults`] (the entry points do) to fill unset values.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of concurrent workers. Zero means [`DEFAULT_CONCURRENCY`].
    pub concurrency: usize,

    /// Logging capability for the run. When `None`, one is built from the
    /// `KILN_LOG` environment variable (default `info`).
    pub log: Option<Dispatch>,

    /// Port to serve `target_dir` on over HTTP. `None` disables serving.
    pub port: Option<u16>,

    pub source_dir: PathBuf,

    pub target_dir: PathBuf,

    /// Glob patterns, relative to `source_dir`, whose changes never trigger
    /// a rebuild.
    pub ignore: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            log: None,
            port: None,
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            target_dir: PathBuf::from(DEFAULT_TARGET_DIR),
            ignore: Vec::new(),
        }
    }
}

impl Config {
    /// Replace unset or non-positive values with their defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.concurrency == 0 {
            self.concurrency = DEFAULT_CONCURRENCY;
        }
        if self.source_dir.as_os_str().is_empty() {
            self.source_dir = PathBuf::from(DEFAULT_SOURCE_DIR);
        }
        if self.target_dir.as_os_str().is_empty() {
            self.target_dir = PathBuf::from(DEFAULT_TARGET_DIR);
        }
        self
    }
}

impl From<&ConfigFile> for Config {
    fn from(file: &ConfigFile) -> Self {
        let build = &file.build;
        Config {
            concurrency: build.concurrency,
            log: None,
            port: build.port,
            source_dir: build.source_dir.clone(),
            target_dir: build.target_dir.clone(),
            ignore: build.ignore.clone(),
        }
        .with_defaults()
    }
}

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [build]
/// concurrency = 8
/// port = 5002
/// source_dir = "content"
/// target_dir = "public"
/// ignore = ["drafts/**", "**/*.swp"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub build: BuildSection,
}

/// Validated configuration file. Built via `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub build: BuildSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(build: BuildSection) -> Self {
        Self { build }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub concurrency: usize,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,

    #[serde(default)]
    pub ignore: Vec<String>,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE_DIR)
}

fn default_target_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TARGET_DIR)
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            concurrency: 0,
            port: None,
            source_dir: default_source_dir(),
            target_dir: default_target_dir(),
            ignore: Vec::new(),
        }
    }
}

impl BuildSection {
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }
}
