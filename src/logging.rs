// src/logging.rs

//! Logging setup for `kiln` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `KILN_LOG` environment variable (any `EnvFilter` directive, e.g.
//!    "debug" or "kiln::watch=trace")
//! 3. default to `info`
//!
//! Nothing here installs a global subscriber. The returned [`Dispatch`] is the
//! logging capability for one run and travels in [`crate::Config::log`].
//! Logs go to STDERR.

use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable consulted when no level is given on the CLI.
pub const LOG_ENV: &str = "KILN_LOG";

/// Build the logging capability for a run.
pub fn build_dispatch(cli_level: Option<LogLevel>) -> Dispatch {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directive_for(lvl)),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    Dispatch::new(subscriber)
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
