//! Workspace: configuration plus the shared index registry.

use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::config::{expand_path, Config, ConfigError};
use crate::error::Result;
use crate::index::{IndexProgress, IndexRegistry, Progress};
use crate::mode::should_stream;
use crate::source::SourceHandle;
use crate::tail::TailFollower;

/// Entry point for opening sources.
///
/// Every streaming source opened here shares one [`IndexRegistry`], so two
/// handles on the same file never scan it twice.
pub struct Workspace {
    config: Config,
    registry: Arc<IndexRegistry>,
}

impl Workspace {
    pub fn new(config: Config) -> Result<Self> {
        Self::build(config, None)
    }

    /// Like [`Workspace::new`], reporting index build progress on `tx`.
    pub fn with_progress(config: Config, tx: Sender<IndexProgress>) -> Result<Self> {
        Self::build(config, Some(tx))
    }

    fn build(config: Config, tx: Option<Sender<IndexProgress>>) -> Result<Self> {
        config
            .check()
            .map_err(|message| ConfigError::Validation {
                path: None,
                message,
            })?;

        let mut registry = IndexRegistry::new();
        if let Some(tx) = tx {
            registry = registry.with_progress(Progress::new(tx).every(config.progress_interval));
        }

        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Open a file, streaming it when the mode selector says so.
    ///
    /// If the index cannot be built the file is loaded directly instead.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<SourceHandle> {
        let path = expand_path(path.as_ref());
        let config = &self.config;

        if should_stream(&path, config.threshold_mb, config.enabled) {
            match SourceHandle::open_streaming(
                &path,
                Arc::clone(&self.registry),
                config.chunk_size,
                config.cache_size,
            ) {
                Ok(source) => return Ok(source),
                Err(e) => {
                    self.registry.evict_unused(&path);
                    warn!(path = %path.display(), error = %e, "cannot index file, falling back to direct mode");
                }
            }
        }

        SourceHandle::open_direct(&path, config.cache_size)
    }

    /// Direct-mode source over content already in memory.
    pub fn open_lines(&self, name: impl AsRef<Path>, lines: Vec<String>) -> SourceHandle {
        SourceHandle::from_lines(name.as_ref(), lines, self.config.cache_size)
    }

    /// Follow `source` at the configured polling interval.
    pub fn follow(&self, source: Arc<Mutex<SourceHandle>>) -> TailFollower {
        TailFollower::start(source, self.config.poll_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mode::{SourceMode, StreamingMode};
    use std::io::Write;
    use std::sync::mpsc::channel;
    use tempfile::NamedTempFile;

    fn jsonl_file(lines: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for n in 1..=lines {
            writeln!(file, "{{\"n\":{}}}", n).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_open_selects_mode_by_size() -> anyhow::Result<()> {
        let file = NamedTempFile::new()?;
        file.as_file().set_len(5 * 1024 * 1024)?;

        let workspace = Workspace::new(Config::default())?;
        assert_eq!(workspace.open(file.path())?.mode(), SourceMode::Direct);

        let workspace = Workspace::new(Config {
            enabled: StreamingMode::Always,
            ..Config::default()
        })?;
        assert_eq!(workspace.open(file.path())?.mode(), SourceMode::Streaming);
        Ok(())
    }

    #[test]
    fn test_streaming_sources_share_registry() -> anyhow::Result<()> {
        let file = jsonl_file(20);
        let workspace = Workspace::new(Config {
            enabled: StreamingMode::Always,
            chunk_size: 5,
            ..Config::default()
        })?;

        let mut a = workspace.open(file.path())?;
        let mut b = workspace.open(file.path())?;
        assert_eq!(workspace.registry().len(), 1);
        assert_eq!(a.get_lines(20, 20)?, b.get_lines(20, 20)?);
        assert_eq!(a.window().map(|w| w.len()), Some(5));
        Ok(())
    }

    #[test]
    fn test_closing_one_source_keeps_shared_index() -> anyhow::Result<()> {
        let file = jsonl_file(100);
        let (tx, rx) = channel();
        let workspace = Workspace::with_progress(
            Config {
                enabled: StreamingMode::Always,
                chunk_size: 10,
                progress_interval: 100,
                ..Config::default()
            },
            tx,
        )?;

        let a = workspace.open(file.path())?;
        let mut b = workspace.open(file.path())?;
        assert_eq!(rx.try_iter().count(), 1);

        a.close();
        assert_eq!(b.get_lines(50, 50)?, vec![r#"{"n":50}"#]);
        assert_eq!(rx.try_iter().count(), 0);
        Ok(())
    }

    #[test]
    fn test_open_missing_file() -> anyhow::Result<()> {
        for enabled in [StreamingMode::Auto, StreamingMode::Always] {
            let workspace = Workspace::new(Config {
                enabled,
                ..Config::default()
            })?;
            let err = match workspace.open("/no/such/dir/app.jsonl") {
                Err(err) => err,
                Ok(_) => panic!("opening a missing file should fail"),
            };
            assert!(err.is_io());
            assert!(workspace.registry().is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_open_lines() -> anyhow::Result<()> {
        let workspace = Workspace::new(Config::default())?;
        let mut source = workspace.open_lines("buffer", vec![r#"{"a":1}"#.to_string()]);
        assert_eq!(source.mode(), SourceMode::Direct);
        assert!(source.record(1)?.unwrap().is_valid());
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Workspace::new(Config {
            chunk_size: 0,
            ..Config::default()
        });
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::Validation { path: None, .. }))
        ));
    }

    #[test]
    fn test_progress_reported() -> anyhow::Result<()> {
        let file = jsonl_file(25);
        let (tx, rx) = channel();
        let workspace = Workspace::with_progress(
            Config {
                enabled: StreamingMode::Always,
                progress_interval: 10,
                ..Config::default()
            },
            tx,
        )?;

        workspace.open(file.path())?;
        let lines: Vec<usize> = rx.try_iter().map(|p| p.lines).collect();
        assert_eq!(lines, vec![10, 20]);
        Ok(())
    }
}
