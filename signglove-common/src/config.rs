//! Configuration file resolution and TOML bootstrap loading
//!
//! Resolution priority for the bootstrap TOML file:
//! 1. Command-line argument (highest priority)
//! 2. `SIGNGLOVE_CONFIG` environment variable
//! 3. User config directory (`<config_dir>/signglove/config.toml`)
//! 4. System config (`/etc/signglove/config.toml`, Linux only)
//!
//! A missing file is never fatal: callers get built-in defaults and a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SIGNGLOVE_CONFIG";

/// Directory name used under the platform config dir
pub const APP_DIR_NAME: &str = "signglove";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Build an `EnvFilter`-compatible directive for the given crate
    ///
    /// Crate names use underscores in tracing targets, so `signglove-engine`
    /// becomes `signglove_engine=<level>`.
    pub fn filter_directive(&self, crate_name: &str) -> String {
        format!("{}={}", crate_name.replace('-', "_"), self.level)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolves which bootstrap TOML file a binary should read
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    file_name: String,
}

impl ConfigFileResolver {
    /// Create a resolver looking for `<file_name>` in the standard locations
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// Resolve the config file path, or `None` when no candidate exists
    ///
    /// An explicit CLI or environment path is returned even if it does not
    /// exist, so the loader can report it; implicit locations are only
    /// returned when present on disk.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(&self.file_name)) {
            if user_config.exists() {
                return Some(user_config);
            }
        }

        if cfg!(target_os = "linux") {
            let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join(&self.file_name);
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }
}

/// Load a TOML document, falling back to `T::default()` when the file is absent
///
/// A file that exists but fails to parse is a hard `Error::Config`.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!("Configuration file {} not found, using built-in defaults", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}
