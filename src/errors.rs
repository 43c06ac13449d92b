// src/errors.rs

//! Crate-wide error types.
//!
//! - [`KilnError`] covers failures of the tool itself (config, watcher,
//!   listener hand-off). These abort a run.
//! - [`BuildError`] is what a build iteration reports: the build function's
//!   own error and any job failures from its phases.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KilnError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Watcher error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Listener error: {0}")]
    ListenerError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A single error reported at the end of a build iteration.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The build function itself returned an error.
    #[error("{0:#}")]
    Build(anyhow::Error),

    /// A job returned an error.
    #[error("job {name} failed: {source:#}")]
    Job {
        name: String,
        source: anyhow::Error,
    },

    /// A job's task panicked before it could report an outcome.
    #[error("job {name} panicked: {message}")]
    JobPanicked { name: String, message: String },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, KilnError>;
