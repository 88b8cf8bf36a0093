//! Config loading for jsonlview.
//!
//! Loads and validates YAML config files with path expansion.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::error::ConfigError;
use crate::config::types::Config;

/// Expand tilde in path to home directory.
///
/// Handles the following cases:
/// - `~/foo` -> `/home/user/foo`
/// - `/absolute/path` -> unchanged
/// - `relative/path` -> unchanged
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    path.to_path_buf()
}

/// Get the global config path: ~/.config/jsonlview/config.yaml
///
/// Always uses `~/.config/` regardless of platform, like other CLI tools.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".config").join("jsonlview").join("config.yaml"))
}

/// Load and validate a YAML config file.
///
/// An empty file yields the defaults.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let path = expand_path(path);
    let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
        path: path.clone(),
        source: e,
    })?;

    let config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_saphyr::from_str::<Config>(&content)
            .map_err(|e| ConfigError::from_saphyr_error(path.clone(), e))?
    };

    config.check().map_err(|message| ConfigError::Validation {
        path: Some(path),
        message,
    })?;

    Ok(config)
}

/// Load the global config if it exists, otherwise return the defaults.
pub fn load_or_default() -> Result<Config, ConfigError> {
    match default_config_path() {
        Some(path) if path.exists() => load(&path),
        _ => Ok(Config::default()),
    }
}
