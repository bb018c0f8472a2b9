//! `packman.toml`: where the registry lives, retry behaviour, logging.
//!
//! Lookup order: an explicit path (which must exist), `./packman.toml`,
//! `<config dir>/packman/config.toml`, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, IoResultExt, Result};
use crate::process::{Privilege, RetryPolicy};

pub const SETTINGS_FILE: &str = "packman.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Component registry file.
    pub registry: PathBuf,
    /// Directory bare bootstrap template names are looked up in.
    pub templates_dir: PathBuf,
    pub executor: ExecutorSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("packages.toml"),
            templates_dir: PathBuf::from("package-templates"),
            executor: ExecutorSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorSettings {
    /// Attempts per command, first one included.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub privilege: Privilege,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            retry_delay_secs: policy.retry_delay.as_secs(),
            privilege: Privilege::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `PACKMAN_LOG`.
    pub level: String,
    /// Plain-text copy of the log.
    pub file: Option<PathBuf>,
    /// Echo rendered templates at debug level.
    pub print_templates: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            print_templates: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .fs_context(|| format!("reading settings '{}'", path.display()))?;
        toml::from_str(&content).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Find and load the settings. Returns the file used, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let candidates = [
            Some(PathBuf::from(SETTINGS_FILE)),
            dirs::config_dir().map(|dir| dir.join("packman").join("config.toml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.executor.max_retries,
            retry_delay: Duration::from_secs(self.executor.retry_delay_secs),
        }
    }
}
