use std::fs::{File, Metadata};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use memchr::memchr;
use tracing::debug;

use crate::error::{IoContext, Result};

const SCAN_BUFFER: usize = 64 * 1024;

/// Bytes hashed at each end of the indexed region to detect rewrites.
const FINGERPRINT_WINDOW: u64 = 4096;

/// Default number of lines between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10_000;

/// (mtime, size) captured when an index was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSignature {
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl SourceSignature {
    pub fn read(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).at_path(path)?;
        Ok(Self::from_metadata(&meta))
    }

    fn from_metadata(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            size: meta.len(),
        }
    }
}

/// xxh3 of the first and last few KiB of the indexed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Fingerprint {
    head: u64,
    tail: u64,
}

impl Fingerprint {
    /// Hash `[0, end)` edges. A short read simply yields a different hash.
    fn compute(file: &File, path: &Path, end: u64) -> Result<Self> {
        let window = end.min(FINGERPRINT_WINDOW);
        let head = hash_region(file, path, 0, window)?;
        let tail = hash_region(file, path, end - window, window)?;
        Ok(Self { head, tail })
    }
}

fn hash_region(file: &File, path: &Path, start: u64, len: u64) -> Result<u64> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(start)).at_path(path)?;
    let mut buf = Vec::with_capacity(len as usize);
    handle.take(len).read_to_end(&mut buf).at_path(path)?;
    Ok(xxhash_rust::xxh3::xxh3_64(&buf))
}

/// Progress snapshot emitted while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProgress {
    pub path: PathBuf,
    pub lines: usize,
    pub bytes: u64,
    pub total_bytes: u64,
}

/// Optional observer for long scans. Sends never block and a dropped
/// receiver is ignored.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: Sender<IndexProgress>,
    interval: usize,
}

impl Progress {
    pub fn new(tx: Sender<IndexProgress>) -> Self {
        Self {
            tx,
            interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn every(mut self, lines: usize) -> Self {
        self.interval = lines.max(1);
        self
    }

    fn report(&self, path: &Path, lines: usize, bytes: u64, total_bytes: u64) {
        let _ = self.tx.send(IndexProgress {
            path: path.to_path_buf(),
            lines,
            bytes,
            total_bytes,
        });
    }
}

/// How `LineIndex::update` brought an index up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUpdate {
    /// Signature unchanged, nothing scanned.
    Unchanged,
    /// Pure append: only the new tail was scanned.
    Appended { previous_lines: usize },
    /// The file was truncated or rewritten; the index was rebuilt.
    Rebuilt,
}

/// Result of scanning `[start, limit)`.
struct Scan {
    /// End offsets of complete lines.
    ends: Vec<u64>,
    /// End of a trailing unterminated line, if any.
    partial_end: Option<u64>,
}

/// Scan for `\n` terminators. `\r\n` needs no special casing: the `\r`
/// is part of the line's span and is stripped when the line is read.
fn scan(
    file: &File,
    path: &Path,
    start: u64,
    limit: u64,
    lines_before: usize,
    progress: Option<&Progress>,
) -> Result<Scan> {
    let mut handle = file;
    handle.seek(SeekFrom::Start(start)).at_path(path)?;
    let mut reader = BufReader::with_capacity(SCAN_BUFFER, handle.take(limit.saturating_sub(start)));

    let mut ends = Vec::new();
    let mut pos = start;
    let mut line_start = start;

    loop {
        let buf = reader.fill_buf().at_path(path)?;
        if buf.is_empty() {
            break;
        }
        let len = buf.len();

        let mut consumed = 0;
        while let Some(i) = memchr(b'\n', &buf[consumed..]) {
            consumed += i + 1;
            line_start = pos + consumed as u64;
            ends.push(line_start);

            if let Some(progress) = progress {
                let lines = lines_before + ends.len();
                if lines % progress.interval == 0 {
                    progress.report(path, lines, line_start, limit);
                }
            }
        }

        pos += len as u64;
        reader.consume(len);
    }

    Ok(Scan {
        ends,
        partial_end: (pos > line_start).then_some(pos),
    })
}

/// Byte-offset table mapping 1-based line numbers to file positions.
///
/// `offsets[0] == 0` and `offsets[i]` is the position right after line
/// `i`'s terminator, so line `i` spans `offsets[i - 1]..offsets[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    offsets: Vec<u64>,
    /// Last entry ends at EOF rather than at a newline.
    partial_tail: bool,
    signature: SourceSignature,
    fingerprint: Fingerprint,
}

impl LineIndex {
    /// Build the index with one linear scan of the file.
    ///
    /// The scan stops at the size captured in the signature, so bytes
    /// appended while scanning are picked up by the next `update`.
    pub fn build(path: &Path, progress: Option<&Progress>) -> Result<Self> {
        let file = File::open(path).at_path(path)?;
        let meta = file.metadata().at_path(path)?;
        Self::build_from(&file, path, SourceSignature::from_metadata(&meta), progress)
    }

    fn build_from(
        file: &File,
        path: &Path,
        signature: SourceSignature,
        progress: Option<&Progress>,
    ) -> Result<Self> {
        let scan = scan(file, path, 0, signature.size, 0, progress)?;

        let mut offsets = Vec::with_capacity(scan.ends.len() + 2);
        offsets.push(0);
        offsets.extend(scan.ends);
        if let Some(end) = scan.partial_end {
            offsets.push(end);
        }

        let end = offsets.last().copied().unwrap_or(0);
        let index = Self {
            offsets,
            partial_tail: scan.partial_end.is_some(),
            signature,
            fingerprint: Fingerprint::compute(file, path, end)?,
        };

        debug!(
            path = %path.display(),
            lines = index.total_lines(),
            bytes = end,
            "built line index"
        );
        Ok(index)
    }

    /// Bring the index up to date with the file on disk.
    ///
    /// Growth is trusted as a pure append only when the file got bigger and
    /// the fingerprint of the previously indexed region is unchanged. In
    /// that case scanning resumes at the last complete line. Any other
    /// change rebuilds from scratch.
    pub fn update(&mut self, path: &Path, progress: Option<&Progress>) -> Result<IndexUpdate> {
        let file = File::open(path).at_path(path)?;
        let meta = file.metadata().at_path(path)?;
        let signature = SourceSignature::from_metadata(&meta);

        if signature == self.signature {
            return Ok(IndexUpdate::Unchanged);
        }

        let indexed_end = self.end_offset();
        let grew = signature.size > self.signature.size && signature.size > indexed_end;
        if grew && Fingerprint::compute(&file, path, indexed_end)? == self.fingerprint {
            let previous_lines = self.total_lines();
            let complete_lines = if self.partial_tail {
                previous_lines - 1
            } else {
                previous_lines
            };
            let resume = self.offsets[complete_lines];

            let scan = scan(&file, path, resume, signature.size, complete_lines, progress)?;

            self.offsets.truncate(complete_lines + 1);
            self.offsets.extend(scan.ends);
            if let Some(end) = scan.partial_end {
                self.offsets.push(end);
            }
            self.partial_tail = scan.partial_end.is_some();
            self.signature = signature;
            self.fingerprint = Fingerprint::compute(&file, path, self.end_offset())?;

            debug!(
                path = %path.display(),
                previous_lines,
                lines = self.total_lines(),
                "extended line index"
            );
            return Ok(IndexUpdate::Appended { previous_lines });
        }

        debug!(
            path = %path.display(),
            old_size = self.signature.size,
            new_size = signature.size,
            "line index is stale, rebuilding"
        );
        *self = Self::build_from(&file, path, signature, progress)?;
        Ok(IndexUpdate::Rebuilt)
    }

    pub fn total_lines(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn signature(&self) -> SourceSignature {
        self.signature
    }

    /// Whether the last line has no terminator yet.
    pub fn has_partial_tail(&self) -> bool {
        self.partial_tail
    }

    /// Byte position just past the last indexed line.
    pub fn end_offset(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Byte span `[start, end)` of a 1-based line, terminator included.
    pub fn line_span(&self, line: usize) -> Option<(u64, u64)> {
        if line == 0 {
            return None;
        }
        let start = *self.offsets.get(line - 1)?;
        let end = *self.offsets.get(line)?;
        Some((start, end))
    }

    /// Compare the captured signature with the file on disk.
    pub fn matches_file(&self, path: &Path) -> Result<bool> {
        Ok(SourceSignature::read(path)? == self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::mpsc::channel;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_file(content: &[u8]) -> anyhow::Result<NamedTempFile> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(content)?;
        temp_file.flush()?;
        Ok(temp_file)
    }

    fn append(path: &Path, content: &[u8]) -> anyhow::Result<()> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(content)?;
        file.flush()?;
        Ok(())
    }

    #[test]
    fn test_build_basic() -> anyhow::Result<()> {
        let temp_file = write_file(b"one\ntwo\nthree\n")?;
        let index = LineIndex::build(temp_file.path(), None)?;

        assert_eq!(index.total_lines(), 3);
        assert_eq!(index.offsets(), &[0, 4, 8, 14]);
        assert!(!index.has_partial_tail());
        assert_eq!(index.signature().size, 14);
        assert_eq!(index.line_span(2), Some((4, 8)));
        assert_eq!(index.line_span(0), None);
        assert_eq!(index.line_span(4), None);
        Ok(())
    }

    #[test]
    fn test_build_empty_file() -> anyhow::Result<()> {
        let temp_file = write_file(b"")?;
        let index = LineIndex::build(temp_file.path(), None)?;

        assert_eq!(index.total_lines(), 0);
        assert_eq!(index.offsets(), &[0]);
        assert_eq!(index.end_offset(), 0);
        Ok(())
    }

    #[test]
    fn test_build_crlf() -> anyhow::Result<()> {
        let temp_file = write_file(b"a\r\nbb\r\nc\n")?;
        let index = LineIndex::build(temp_file.path(), None)?;

        assert_eq!(index.total_lines(), 3);
        assert_eq!(index.offsets(), &[0, 3, 7, 9]);
        Ok(())
    }

    #[test]
    fn test_build_partial_tail() -> anyhow::Result<()> {
        let temp_file = write_file(b"one\ntwo")?;
        let index = LineIndex::build(temp_file.path(), None)?;

        assert_eq!(index.total_lines(), 2);
        assert_eq!(index.offsets(), &[0, 4, 7]);
        assert!(index.has_partial_tail());
        Ok(())
    }

    #[test]
    fn test_offsets_strictly_increasing() -> anyhow::Result<()> {
        let temp_file = write_file(b"\n\n{}\n\r\n\nlast")?;
        let index = LineIndex::build(temp_file.path(), None)?;

        assert_eq!(index.total_lines(), 6);
        assert!(index.offsets().windows(2).all(|w| w[0] < w[1]));
        Ok(())
    }

    #[test]
    fn test_build_spans_scan_buffer() -> anyhow::Result<()> {
        let mut content = Vec::new();
        for i in 0..20_000 {
            content.extend_from_slice(format!("{{\"n\":{}}}\n", i).as_bytes());
        }
        let temp_file = write_file(&content)?;
        let index = LineIndex::build(temp_file.path(), None)?;

        assert_eq!(index.total_lines(), 20_000);
        assert_eq!(index.end_offset(), content.len() as u64);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LineIndex::build(Path::new("/definitely/not/here.jsonl"), None).unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("/definitely/not/here.jsonl"));
    }

    #[test]
    fn test_update_unchanged() -> anyhow::Result<()> {
        let temp_file = write_file(b"a\nb\n")?;
        let mut index = LineIndex::build(temp_file.path(), None)?;

        assert_eq!(index.update(temp_file.path(), None)?, IndexUpdate::Unchanged);
        assert_eq!(index.total_lines(), 2);
        Ok(())
    }

    #[test]
    fn test_update_append_matches_fresh_build() -> anyhow::Result<()> {
        let temp_file = write_file(b"{\"a\":1}\n{\"a\":2}\n")?;
        let mut index = LineIndex::build(temp_file.path(), None)?;

        append(temp_file.path(), b"{\"a\":3}\n{\"a\":4}\n{\"a\":5}\n")?;
        let outcome = index.update(temp_file.path(), None)?;

        assert_eq!(outcome, IndexUpdate::Appended { previous_lines: 2 });
        let fresh = LineIndex::build(temp_file.path(), None)?;
        assert_eq!(index.offsets(), fresh.offsets());
        assert_eq!(index.total_lines(), 5);
        assert_eq!(index, fresh);
        Ok(())
    }

    #[test]
    fn test_update_completes_partial_line() -> anyhow::Result<()> {
        let temp_file = write_file(b"{\"a\":1}\n{\"a\":")?;
        let mut index = LineIndex::build(temp_file.path(), None)?;
        assert_eq!(index.total_lines(), 2);
        assert!(index.has_partial_tail());

        append(temp_file.path(), b"2}\n{\"a\":3}\n")?;
        let outcome = index.update(temp_file.path(), None)?;

        assert_eq!(outcome, IndexUpdate::Appended { previous_lines: 2 });
        assert_eq!(index.total_lines(), 3);
        assert!(!index.has_partial_tail());
        assert_eq!(index.offsets(), LineIndex::build(temp_file.path(), None)?.offsets());
        Ok(())
    }

    #[test]
    fn test_update_after_truncation_rebuilds() -> anyhow::Result<()> {
        let temp_file = write_file(b"line 1\nline 2\nline 3\nline 4\n")?;
        let mut index = LineIndex::build(temp_file.path(), None)?;

        std::fs::write(temp_file.path(), b"new 1\nnew 2\n")?;
        let outcome = index.update(temp_file.path(), None)?;

        assert_eq!(outcome, IndexUpdate::Rebuilt);
        assert_eq!(index.total_lines(), 2);
        assert_eq!(index.offsets(), &[0, 6, 12]);
        Ok(())
    }

    #[test]
    fn test_update_detects_rewrite_then_growth() -> anyhow::Result<()> {
        let temp_file = write_file(b"aaaa\nbbbb\n")?;
        let mut index = LineIndex::build(temp_file.path(), None)?;

        // Rewritten in place and grown: size alone would look like an append.
        std::fs::write(temp_file.path(), b"cc\ndd\neeee\nffff\n")?;
        let outcome = index.update(temp_file.path(), None)?;

        assert_eq!(outcome, IndexUpdate::Rebuilt);
        assert_eq!(index.offsets(), &[0, 3, 6, 11, 16]);
        Ok(())
    }

    #[test]
    fn test_same_size_rewrite_with_new_mtime_rebuilds() -> anyhow::Result<()> {
        let temp_file = write_file(b"ab\ncd\n")?;
        let mut index = LineIndex::build(temp_file.path(), None)?;
        let original = index.signature();

        std::fs::write(temp_file.path(), b"abcd\n\n")?;
        let file = OpenOptions::new().write(true).open(temp_file.path())?;
        let later = original.modified.unwrap_or(SystemTime::now()) + Duration::from_secs(5);
        file.set_modified(later)?;
        drop(file);

        assert!(!index.matches_file(temp_file.path())?);
        let outcome = index.update(temp_file.path(), None)?;

        assert_eq!(outcome, IndexUpdate::Rebuilt);
        assert_eq!(index.offsets(), &[0, 5, 6]);
        Ok(())
    }

    #[test]
    fn test_progress_reports() -> anyhow::Result<()> {
        let mut content = String::new();
        for i in 0..25 {
            content.push_str(&format!("{{\"i\":{}}}\n", i));
        }
        let temp_file = write_file(content.as_bytes())?;

        let (tx, rx) = channel();
        let progress = Progress::new(tx).every(10);
        LineIndex::build(temp_file.path(), Some(&progress))?;
        drop(progress);

        let reports: Vec<usize> = rx.iter().map(|p| p.lines).collect();
        assert_eq!(reports, vec![10, 20]);
        Ok(())
    }

    #[test]
    fn test_progress_with_dropped_receiver() -> anyhow::Result<()> {
        let temp_file = write_file(b"a\nb\nc\n")?;
        let (tx, rx) = channel();
        drop(rx);

        let progress = Progress::new(tx).every(1);
        let index = LineIndex::build(temp_file.path(), Some(&progress))?;
        assert_eq!(index.total_lines(), 3);
        Ok(())
    }
}
