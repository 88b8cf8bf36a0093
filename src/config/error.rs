//! Config error types for jsonlview.
//!
//! Provides Cargo-style error messages with the offending file location.

use std::fmt;
use std::path::PathBuf;

/// Error loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the config file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// YAML parse error.
    Parse { path: PathBuf, message: String },

    /// Validation error (semantic errors after parsing). `path` is `None`
    /// for configs built in code.
    Validation {
        path: Option<PathBuf>,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn from_saphyr_error(path: PathBuf, err: serde_saphyr::Error) -> Self {
        ConfigError::Parse {
            path,
            message: err.to_string(),
        }
    }

    /// Format error in Cargo-style format.
    pub fn format_cargo_style(&self) -> String {
        match self {
            ConfigError::Io { path, source } => {
                format!(
                    "error: cannot read config file\n  --> {}\n  |\n  = {}\n",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, message } => {
                format!("error: {}\n  --> {}\n  |\n", message, path.display())
            }
            ConfigError::Validation {
                path: Some(path),
                message,
            } => {
                format!("error: {}\n  --> {}\n  |\n", message, path.display())
            }
            ConfigError::Validation {
                path: None,
                message,
            } => format!("error: {}\n", message),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_cargo_style())
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
