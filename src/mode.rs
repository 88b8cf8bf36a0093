//! Direct vs streaming mode selection.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The `enabled` setting: an explicit override or size-based `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawStreamingMode")]
pub enum StreamingMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Accepts `auto`, `true`/`false`, and their string spellings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawStreamingMode {
    Flag(bool),
    Keyword(String),
}

impl TryFrom<RawStreamingMode> for StreamingMode {
    type Error = String;

    fn try_from(raw: RawStreamingMode) -> Result<Self, Self::Error> {
        match raw {
            RawStreamingMode::Flag(true) => Ok(StreamingMode::Always),
            RawStreamingMode::Flag(false) => Ok(StreamingMode::Never),
            RawStreamingMode::Keyword(word) => match word.to_lowercase().as_str() {
                "auto" => Ok(StreamingMode::Auto),
                "true" | "always" | "on" => Ok(StreamingMode::Always),
                "false" | "never" | "off" => Ok(StreamingMode::Never),
                other => Err(format!(
                    "invalid streaming mode `{}`: expected auto, true or false",
                    other
                )),
            },
        }
    }
}

/// How an open source is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Whole file held in memory.
    Direct,
    /// Line index plus windowed reads.
    Streaming,
}

/// Decide whether `path` should be streamed.
///
/// Only stats the file. A file that cannot be stat'd is left to direct mode,
/// which will surface the I/O error when it tries to load.
pub fn should_stream(path: &Path, threshold_mb: f64, mode: StreamingMode) -> bool {
    match mode {
        StreamingMode::Always => true,
        StreamingMode::Never => false,
        StreamingMode::Auto => match std::fs::metadata(path) {
            Ok(meta) => meta.len() as f64 / BYTES_PER_MB > threshold_mb,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot stat file, using direct mode");
                false
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sized_file(bytes: u64) -> NamedTempFile {
        let temp_file = NamedTempFile::new().unwrap();
        temp_file.as_file().set_len(bytes).unwrap();
        temp_file
    }

    #[test]
    fn test_auto_below_threshold_is_direct() {
        let temp_file = sized_file(5 * 1024 * 1024);
        assert!(!should_stream(temp_file.path(), 10.0, StreamingMode::Auto));
    }

    #[test]
    fn test_override_forces_streaming() {
        let temp_file = sized_file(5 * 1024 * 1024);
        assert!(should_stream(temp_file.path(), 10.0, StreamingMode::Always));
    }

    #[test]
    fn test_auto_above_threshold_streams() {
        let temp_file = sized_file(2 * 1024 * 1024);
        assert!(should_stream(temp_file.path(), 1.0, StreamingMode::Auto));
        assert!(!should_stream(temp_file.path(), 1.0, StreamingMode::Never));
    }

    #[test]
    fn test_missing_file_is_direct() {
        assert!(!should_stream(
            Path::new("/no/such/file.jsonl"),
            0.0,
            StreamingMode::Auto
        ));
    }

    #[test]
    fn test_mode_from_raw() {
        assert_eq!(
            StreamingMode::try_from(RawStreamingMode::Flag(true)),
            Ok(StreamingMode::Always)
        );
        assert_eq!(
            StreamingMode::try_from(RawStreamingMode::Keyword("AUTO".into())),
            Ok(StreamingMode::Auto)
        );
        assert_eq!(
            StreamingMode::try_from(RawStreamingMode::Keyword("off".into())),
            Ok(StreamingMode::Never)
        );
        assert!(StreamingMode::try_from(RawStreamingMode::Keyword("sometimes".into())).is_err());
    }
}
