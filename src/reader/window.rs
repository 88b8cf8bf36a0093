use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IoContext, Result};
use crate::index::LineIndex;

use super::{clamp_range, strip_terminator};

/// Sequential reader positioned by index offsets.
///
/// Contiguous lines need one seek; a gap (or a span missing from a partially
/// built index) is handled per line.
struct SpanReader {
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
}

impl SpanReader {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).at_path(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            position: 0,
        })
    }

    fn read_line(&mut self, index: &LineIndex, line: usize) -> Result<String> {
        let Some((start, end)) = index.line_span(line) else {
            return Ok(String::new());
        };

        if start != self.position {
            self.reader
                .seek(SeekFrom::Start(start))
                .at_path(&self.path)?;
            self.position = start;
        }

        let mut buf = Vec::with_capacity((end - start) as usize);
        let read = (&mut self.reader)
            .take(end - start)
            .read_to_end(&mut buf)
            .at_path(&self.path)?;
        self.position += read as u64;

        Ok(strip_terminator(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// Read lines `start..=end` (1-based, clamped to the file).
///
/// Out-of-range requests are clamped rather than rejected, so
/// `read_range(path, idx, -5, 1_000_000_000)` returns every line.
pub fn read_range(path: &Path, index: &LineIndex, start: i64, end: i64) -> Result<Vec<String>> {
    let Some((start, end)) = clamp_range(start, end, index.total_lines()) else {
        return Ok(Vec::new());
    };

    let mut reader = SpanReader::open(path)?;
    (start..=end)
        .map(|line| reader.read_line(index, line))
        .collect()
}

/// Read a single line. Clamped like `read_range`.
pub fn read_one(path: &Path, index: &LineIndex, line: i64) -> Result<Option<String>> {
    Ok(read_range(path, index, line, line)?.into_iter().next())
}

/// Lazy forward iteration over `start..=end` (or to end of file).
///
/// The iterator owns its file handle and index snapshot. It is single-pass:
/// iterate again by calling `iter_range` again.
pub fn iter_range(
    path: &Path,
    index: Arc<LineIndex>,
    start: i64,
    end: Option<i64>,
) -> Result<LineIter> {
    let total = index.total_lines();
    let end = end.unwrap_or(total as i64);
    let Some((start, end)) = clamp_range(start, end, total) else {
        return Ok(LineIter::empty(index));
    };

    Ok(LineIter {
        reader: Some(SpanReader::open(path)?),
        index,
        next: start,
        end,
    })
}

/// Iterator returned by [`iter_range`].
pub struct LineIter {
    reader: Option<SpanReader>,
    index: Arc<LineIndex>,
    next: usize,
    end: usize,
}

impl LineIter {
    fn empty(index: Arc<LineIndex>) -> Self {
        Self {
            reader: None,
            index,
            next: 1,
            end: 0,
        }
    }

    /// Lines not yet yielded.
    pub fn remaining(&self) -> usize {
        if self.reader.is_none() {
            0
        } else {
            (self.end + 1).saturating_sub(self.next)
        }
    }
}

impl Iterator for LineIter {
    type Item = Result<(usize, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;

        if self.next > self.end {
            self.reader = None;
            return None;
        }

        let line = self.next;
        self.next += 1;

        match reader.read_line(&self.index, line) {
            Ok(content) => {
                if self.next > self.end {
                    self.reader = None;
                }
                Some(Ok((line, content)))
            }
            Err(e) => {
                self.reader = None;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (0, Some(remaining))
    }
}
