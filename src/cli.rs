// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::debug;

use crate::config::{default_config_path, load_and_validate, validate_dirs, Config};
use crate::errors::Result;

/// Command-line arguments for `kiln`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Incrementally rebuild a target directory from a source tree, rebuilding on change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Kiln.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Source directory to read from.
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Target directory to build into.
    #[arg(long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Serve the target directory over HTTP on this port.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Number of concurrent workers.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Build once and exit; no watching, no serving.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KILN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Merge the config file (if any) with CLI overrides.
///
/// An explicit `--config` must exist; the implicit `Kiln.toml` is optional.
pub fn resolve_config(args: &CliArgs) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::from(&load_and_validate(path)?),
        None => {
            let path = default_config_path();
            if path.is_file() {
                debug!(?path, "loading default config file");
                Config::from(&load_and_validate(&path)?)
            } else {
                Config::default()
            }
        }
    };

    if let Some(source) = &args.source {
        cfg.source_dir = source.clone();
    }
    if let Some(target) = &args.target {
        cfg.target_dir = target.clone();
    }
    if let Some(port) = args.port {
        cfg.port = Some(port);
    }
    if let Some(concurrency) = args.concurrency {
        cfg.concurrency = concurrency;
    }

    let cfg = cfg.with_defaults();
    validate_dirs(&cfg.source_dir, &cfg.target_dir)?;
    Ok(cfg)
}
