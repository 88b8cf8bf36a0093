//! SourceHandle: one open JSONL source behind a mode-transparent API.
//!
//! Direct sources hold every line in memory. Streaming sources go through
//! the shared [`IndexRegistry`] for random access and keep a materialized
//! window in a [`ChunkLoader`]. Both layer a per-source [`ParseCache`] on
//! top, keyed by absolute line number.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheStats, ParseCache};
use crate::chunk::{ChunkLoader, Window};
use crate::error::{IoContext, Result};
use crate::index::{IndexRegistry, IndexUpdate, LineIndex, SourceSignature};
use crate::mode::SourceMode;
use crate::reader::{self, clamp_range, strip_terminator, LineIter};
use crate::record::{self, Record};

/// What a refresh found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Lines were appended. `previous_lines` may have been a partial line
    /// that is now longer.
    Grew {
        previous_lines: usize,
        total_lines: usize,
    },
    /// The content was replaced; every earlier line number is suspect.
    Rebuilt { total_lines: usize },
}

impl Refresh {
    pub fn total_lines(&self) -> usize {
        match *self {
            Refresh::Grew { total_lines, .. } | Refresh::Rebuilt { total_lines } => total_lines,
        }
    }
}

/// Read a file into lines with the same line rules as the index.
fn load_lines(path: &Path) -> Result<(Vec<String>, SourceSignature)> {
    let signature = SourceSignature::read(path)?;
    let bytes = fs::read(path).at_path(path)?;
    let lines = String::from_utf8_lossy(&bytes)
        .split_inclusive('\n')
        .map(|line| strip_terminator(line.to_string()))
        .collect();
    Ok((lines, signature))
}

struct Direct {
    lines: Arc<Vec<String>>,
    /// Signature of the file the lines came from; `None` for in-memory content.
    origin: Option<SourceSignature>,
}

impl Direct {
    fn sync(&mut self, path: &Path, cache: &mut ParseCache) -> Result<Option<Refresh>> {
        let Some(origin) = self.origin else {
            return Ok(None);
        };
        if SourceSignature::read(path)? == origin {
            return Ok(None);
        }

        let (lines, signature) = load_lines(path)?;
        let previous_lines = self.lines.len();
        let kept = previous_lines.saturating_sub(1);
        let appended = lines.len() >= previous_lines && lines[..kept] == self.lines[..kept];

        let refresh = if appended {
            cache.invalidate_range(previous_lines.max(1), usize::MAX);
            Refresh::Grew {
                previous_lines,
                total_lines: lines.len(),
            }
        } else {
            cache.clear();
            Refresh::Rebuilt {
                total_lines: lines.len(),
            }
        };

        debug!(path = %path.display(), ?refresh, "reloaded direct source");
        self.lines = Arc::new(lines);
        self.origin = Some(signature);
        Ok(Some(refresh))
    }
}

struct Streaming {
    registry: Arc<IndexRegistry>,
    loader: ChunkLoader,
    /// The index state this handle last synchronized with.
    signature: SourceSignature,
    total_lines: usize,
}

impl Streaming {
    /// Current index, synchronizing first if someone else moved it on.
    fn index(&mut self, path: &Path, cache: &mut ParseCache) -> Result<Arc<LineIndex>> {
        match self.registry.get(path) {
            Some(index) if index.signature() == self.signature => Ok(index),
            _ => Ok(self.sync(path, cache)?.0),
        }
    }

    /// Bring the registry index up to date and align the cache and window
    /// with it.
    ///
    /// An append is only trusted when it continues exactly from the line
    /// count this handle last saw. Anything else is treated as a rebuild.
    fn sync(
        &mut self,
        path: &Path,
        cache: &mut ParseCache,
    ) -> Result<(Arc<LineIndex>, Option<Refresh>)> {
        let (index, outcome) = self.registry.update_index(path)?;
        let total_lines = index.total_lines();

        if index.signature() == self.signature && total_lines == self.total_lines {
            return Ok((index, None));
        }

        let refresh = match outcome {
            IndexUpdate::Appended { previous_lines } if previous_lines == self.total_lines => {
                Refresh::Grew {
                    previous_lines,
                    total_lines,
                }
            }
            _ => Refresh::Rebuilt { total_lines },
        };

        let fetch = |w: Window| reader::read_range(path, &index, w.start as i64, w.end as i64);
        match refresh {
            Refresh::Grew { previous_lines, .. } => {
                cache.invalidate_range(previous_lines.max(1), usize::MAX);
                match self.loader.window() {
                    None => {
                        self.loader.activate(1, total_lines, fetch)?;
                    }
                    Some(window) => {
                        if !self.loader.on_growth(total_lines, fetch)? && window.end >= previous_lines {
                            // The old last line may have been partial.
                            self.loader.reload(total_lines, fetch)?;
                        }
                    }
                }
            }
            Refresh::Rebuilt { .. } => {
                cache.clear();
                if self.loader.window().is_some() {
                    self.loader.reload(total_lines, fetch)?;
                } else {
                    self.loader.activate(1, total_lines, fetch)?;
                }
            }
        }

        self.signature = index.signature();
        self.total_lines = total_lines;
        Ok((index, Some(refresh)))
    }

    /// Re-read the materialized window without touching the index.
    fn reload_window(&mut self, path: &Path, index: &LineIndex) -> Result<()> {
        let fetch = |w: Window| reader::read_range(path, index, w.start as i64, w.end as i64);
        self.loader.reload(self.total_lines, fetch)?;
        Ok(())
    }
}

enum Backing {
    Direct(Direct),
    Streaming(Streaming),
}

/// An open source. Not `Clone`: share it as `Arc<Mutex<SourceHandle>>`
/// when a [`crate::tail::TailFollower`] needs it.
pub struct SourceHandle {
    path: PathBuf,
    backing: Backing,
    cache: ParseCache,
    /// Set by `invalidate`; the next access re-checks the file.
    stale: bool,
}

impl SourceHandle {
    /// Load a whole file into memory.
    pub(crate) fn open_direct(path: &Path, cache_size: usize) -> Result<Self> {
        let (lines, signature) = load_lines(path)?;
        debug!(path = %path.display(), lines = lines.len(), "opened direct source");
        Ok(Self {
            path: path.to_path_buf(),
            backing: Backing::Direct(Direct {
                lines: Arc::new(lines),
                origin: Some(signature),
            }),
            cache: ParseCache::new(cache_size),
            stale: false,
        })
    }

    /// In-memory content that has no file behind it (an editor buffer).
    pub(crate) fn from_lines(name: impl Into<PathBuf>, lines: Vec<String>, cache_size: usize) -> Self {
        Self {
            path: name.into(),
            backing: Backing::Direct(Direct {
                lines: Arc::new(lines),
                origin: None,
            }),
            cache: ParseCache::new(cache_size),
            stale: false,
        }
    }

    /// Index the file through `registry` and materialize the first chunk.
    pub(crate) fn open_streaming(
        path: &Path,
        registry: Arc<IndexRegistry>,
        chunk_size: usize,
        cache_size: usize,
    ) -> Result<Self> {
        let index = registry.build_index(path)?;
        let mut loader = ChunkLoader::new(chunk_size);
        loader.activate(1, index.total_lines(), |w| {
            reader::read_range(path, &index, w.start as i64, w.end as i64)
        })?;

        debug!(
            path = %path.display(),
            lines = index.total_lines(),
            chunk_size,
            "opened streaming source"
        );
        registry.acquire(path);
        Ok(Self {
            path: path.to_path_buf(),
            backing: Backing::Streaming(Streaming {
                registry,
                loader,
                signature: index.signature(),
                total_lines: index.total_lines(),
            }),
            cache: ParseCache::new(cache_size),
            stale: false,
        })
    }

    /// File path, or the name given to an in-memory source.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> SourceMode {
        match self.backing {
            Backing::Direct(_) => SourceMode::Direct,
            Backing::Streaming(_) => SourceMode::Streaming,
        }
    }

    /// Line count, re-checking the file first if the source was
    /// invalidated.
    pub fn line_count(&mut self) -> Result<usize> {
        self.ensure_fresh()?;
        Ok(self.total_lines())
    }

    /// Line count as of the last access or refresh. Use
    /// [`SourceHandle::line_count`] after `invalidate`.
    pub fn total_lines(&self) -> usize {
        match &self.backing {
            Backing::Direct(direct) => direct.lines.len(),
            Backing::Streaming(streaming) => streaming.total_lines,
        }
    }

    /// Visible window in streaming mode.
    pub fn window(&self) -> Option<Window> {
        match &self.backing {
            Backing::Direct(_) => None,
            Backing::Streaming(streaming) => streaming.loader.window(),
        }
    }

    /// Materialized lines of the visible window (the whole file in direct
    /// mode).
    pub fn window_lines(&self) -> &[String] {
        match &self.backing {
            Backing::Direct(direct) => &direct.lines,
            Backing::Streaming(streaming) => streaming.loader.lines(),
        }
    }

    fn ensure_fresh(&mut self) -> Result<()> {
        if !self.stale {
            return Ok(());
        }
        match &mut self.backing {
            Backing::Direct(direct) => {
                direct.sync(&self.path, &mut self.cache)?;
            }
            Backing::Streaming(streaming) => {
                let (index, refresh) = streaming.sync(&self.path, &mut self.cache)?;
                if refresh.is_none() {
                    streaming.reload_window(&self.path, &index)?;
                }
            }
        }
        self.stale = false;
        Ok(())
    }

    /// Lines `start..=end`, 1-based and clamped like
    /// [`reader::read_range`].
    pub fn get_lines(&mut self, start: i64, end: i64) -> Result<Vec<String>> {
        self.ensure_fresh()?;
        let Some((start, end)) = clamp_range(start, end, self.total_lines()) else {
            return Ok(Vec::new());
        };

        match &mut self.backing {
            Backing::Direct(direct) => Ok(direct.lines[start - 1..end].to_vec()),
            Backing::Streaming(streaming) => {
                if let Some(window) = streaming.loader.window() {
                    if window.contains(start) && window.contains(end) {
                        let offset = window.start;
                        return Ok(streaming.loader.lines()[start - offset..=end - offset].to_vec());
                    }
                }
                let index = streaming.index(&self.path, &mut self.cache)?;
                reader::read_range(&self.path, &index, start as i64, end as i64)
            }
        }
    }

    /// Lazy forward iteration from `start` to `end` (or end of file).
    ///
    /// The stream owns a snapshot of the content, so it stays valid after
    /// the handle moves on.
    pub fn iter_lines(&mut self, start: i64, end: Option<i64>) -> Result<LineStream> {
        self.ensure_fresh()?;
        match &mut self.backing {
            Backing::Direct(direct) => {
                let total = direct.lines.len();
                let range = clamp_range(start, end.unwrap_or(total as i64), total);
                Ok(LineStream {
                    inner: Stream::Memory {
                        lines: Arc::clone(&direct.lines),
                        next: range.map_or(1, |(s, _)| s),
                        end: range.map_or(0, |(_, e)| e),
                    },
                })
            }
            Backing::Streaming(streaming) => {
                let index = streaming.index(&self.path, &mut self.cache)?;
                Ok(LineStream {
                    inner: Stream::File(reader::iter_range(&self.path, index, start, end)?),
                })
            }
        }
    }

    /// Parsed record for a 1-based line, through the parse cache.
    ///
    /// `Ok(None)` for line numbers outside the file.
    pub fn record(&mut self, line: usize) -> Result<Option<Arc<Record>>> {
        self.ensure_fresh()?;
        if line == 0 || line > self.total_lines() {
            return Ok(None);
        }
        if let Some(record) = self.cache.get(line) {
            return Ok(Some(record));
        }

        let raw = match &mut self.backing {
            Backing::Direct(direct) => direct.lines[line - 1].clone(),
            Backing::Streaming(streaming) => match streaming.loader.line(line) {
                Some(raw) => raw.to_string(),
                None => {
                    let index = streaming.index(&self.path, &mut self.cache)?;
                    reader::read_one(&self.path, &index, line as i64)?.unwrap_or_default()
                }
            },
        };
        Ok(Some(self.cache.get_or_parse(line, &raw, record::parse)))
    }

    /// Report the cursor's 1-based position within the window.
    ///
    /// Returns the new relative position when the window moved. Direct
    /// sources have no window and always return `None`.
    pub fn notify_cursor(&mut self, cursor: usize) -> Result<Option<usize>> {
        self.ensure_fresh()?;
        let Backing::Streaming(streaming) = &mut self.backing else {
            return Ok(None);
        };
        let index = streaming.index(&self.path, &mut self.cache)?;
        let path = &self.path;
        let shift = streaming.loader.on_cursor(cursor, streaming.total_lines, |w| {
            reader::read_range(path, &index, w.start as i64, w.end as i64)
        })?;
        Ok(shift.map(|shift| shift.cursor))
    }

    /// Bring an absolute line into view, centring the window on it.
    ///
    /// Returns the line's position relative to the window, which in direct
    /// mode is the line number itself.
    pub fn jump_to(&mut self, line: usize) -> Result<Option<usize>> {
        self.ensure_fresh()?;
        match &mut self.backing {
            Backing::Direct(direct) => {
                let total = direct.lines.len();
                Ok((total > 0).then(|| line.clamp(1, total)))
            }
            Backing::Streaming(streaming) => {
                let index = streaming.index(&self.path, &mut self.cache)?;
                let path = &self.path;
                streaming.loader.jump_to(line, streaming.total_lines, |w| {
                    reader::read_range(path, &index, w.start as i64, w.end as i64)
                })
            }
        }
    }

    /// Drop cached parses (a range, or everything) and re-check the file on
    /// the next access.
    pub fn invalidate(&mut self, range: Option<RangeInclusive<usize>>) {
        match range {
            Some(range) => self.cache.invalidate_range(*range.start(), *range.end()),
            None => self.cache.clear(),
        }
        self.stale = true;
    }

    /// Re-stat the file and pick up growth or replacement.
    ///
    /// `Ok(None)` when nothing changed or the source has no file.
    pub fn refresh(&mut self) -> Result<Option<Refresh>> {
        let refresh = match &mut self.backing {
            Backing::Direct(direct) => direct.sync(&self.path, &mut self.cache)?,
            Backing::Streaming(streaming) => streaming.sync(&self.path, &mut self.cache)?.1,
        };
        self.stale = false;
        Ok(refresh)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn set_cache_size(&mut self, capacity: usize) {
        self.cache.resize(capacity);
    }

    /// Release the source. The registry keeps a streaming index until its
    /// last source is closed or dropped.
    pub fn close(self) {
        debug!(path = %self.path.display(), "closed source");
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        if let Backing::Streaming(streaming) = &self.backing {
            streaming.registry.release(&self.path);
        }
    }
}

enum Stream {
    Memory {
        lines: Arc<Vec<String>>,
        next: usize,
        end: usize,
    },
    File(LineIter),
}

/// Iterator returned by [`SourceHandle::iter_lines`].
pub struct LineStream {
    inner: Stream,
}

impl Iterator for LineStream {
    type Item = Result<(usize, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            Stream::Memory { lines, next, end } => {
                if *next > *end {
                    return None;
                }
                let line = *next;
                *next += 1;
                Some(Ok((line, lines[line - 1].clone())))
            }
            Stream::File(iter) => iter.next(),
        }
    }
}
