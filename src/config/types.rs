//! Config types for jsonlview.

use serde::Deserialize;
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::index::DEFAULT_PROGRESS_INTERVAL;
use crate::mode::StreamingMode;

pub const DEFAULT_THRESHOLD_MB: f64 = 10.0;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Engine configuration.
///
/// Mirrors the YAML config file. Every key is optional and unknown keys are
/// rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `auto`, `true` or `false`: whether files are streamed.
    pub enabled: StreamingMode,
    /// Files larger than this many MiB stream in `auto` mode.
    pub threshold_mb: f64,
    /// Lines materialized in the visible window.
    pub chunk_size: usize,
    /// Parse cache capacity per open source.
    pub cache_size: usize,
    /// Tail mode polling interval.
    pub poll_interval_ms: u64,
    /// Lines between index build progress reports.
    pub progress_interval: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: StreamingMode::Auto,
            threshold_mb: DEFAULT_THRESHOLD_MB,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_size: DEFAULT_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Semantic checks that serde cannot express.
    pub fn check(&self) -> Result<(), String> {
        if !self.threshold_mb.is_finite() || self.threshold_mb < 0.0 {
            return Err(format!(
                "threshold_mb must be a non-negative number, got {}",
                self.threshold_mb
            ));
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        if self.cache_size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        if self.progress_interval == 0 {
            return Err("progress_interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.enabled, StreamingMode::Auto);
        assert_eq!(config.threshold_mb, 10.0);
        assert_eq!(config.cache_size, 100);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_check_rejects_zero_sizes() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(config.check().unwrap_err().contains("chunk_size"));

        let config = Config {
            cache_size: 0,
            ..Config::default()
        };
        assert!(config.check().unwrap_err().contains("cache_size"));
    }

    #[test]
    fn test_check_rejects_bad_threshold() {
        for threshold_mb in [-1.0, f64::NAN, f64::INFINITY] {
            let config = Config {
                threshold_mb,
                ..Config::default()
            };
            assert!(config.check().is_err());
        }
    }
}
