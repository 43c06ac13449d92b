// src/config/mod.rs

//! Configuration for kiln.
//!
//! Responsibilities:
//! - Define the runtime [`Config`] and the TOML-backed file model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{BuildSection, Config, ConfigFile, RawConfigFile, DEFAULT_CONCURRENCY};
pub use validate::validate_dirs;
