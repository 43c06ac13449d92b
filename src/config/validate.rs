// src/config/validate.rs

use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{KilnError, Result};
use crate::fs::absolutize;
use crate::watch::patterns::compile_ignore_set;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = KilnError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.build))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_dirs(cfg.build.source_dir(), cfg.build.target_dir())?;
    compile_ignore_set(&cfg.build.ignore)?;
    Ok(())
}

/// Building into the source directory would make every build feed the
/// watcher its own output. Paths are compared in absolute form, so `.` and
/// the working directory's absolute path count as the same directory.
pub fn validate_dirs(source: &Path, target: &Path) -> Result<()> {
    if absolutize(source) == absolutize(target) {
        return Err(KilnError::ConfigError(format!(
            "[build].target_dir must differ from source_dir (both are {})",
            source.display()
        )));
    }
    Ok(())
}
