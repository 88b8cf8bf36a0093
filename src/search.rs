//! Field search over a source, with wrap-around.

use serde_json::Value;

use crate::error::Result;
use crate::record;
use crate::source::SourceHandle;

/// Lines read per step when searching backwards.
const BACKWARD_BLOCK: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// `path == expected`, compared the way [`record::matches`] does.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldQuery {
    pub path: String,
    pub expected: Value,
}

impl FieldQuery {
    pub fn new(path: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
        }
    }

    fn matches_line(&self, raw: &str) -> bool {
        record::matches(&record::parse(raw), &self.path, &self.expected)
    }
}

/// Next matching line after (or before) `from`, wrapping around the file.
///
/// `from` itself is checked last, so a lone match is found again. Lines
/// that fail to parse never match. Matching lines are parsed directly
/// rather than through the parse cache so a long scan does not flush it.
pub fn find_next(
    source: &mut SourceHandle,
    query: &FieldQuery,
    from: usize,
    direction: Direction,
) -> Result<Option<usize>> {
    let total = source.line_count()?;
    if total == 0 {
        return Ok(None);
    }
    let from = from.clamp(1, total);

    match direction {
        Direction::Forward => {
            if from < total {
                if let Some(hit) = scan_forward(source, query, from + 1, total)? {
                    return Ok(Some(hit));
                }
            }
            scan_forward(source, query, 1, from)
        }
        Direction::Backward => {
            if from > 1 {
                if let Some(hit) = scan_backward(source, query, from - 1, 1)? {
                    return Ok(Some(hit));
                }
            }
            scan_backward(source, query, total, from)
        }
    }
}

fn scan_forward(
    source: &mut SourceHandle,
    query: &FieldQuery,
    start: usize,
    end: usize,
) -> Result<Option<usize>> {
    for item in source.iter_lines(start as i64, Some(end as i64))? {
        let (line, raw) = item?;
        if query.matches_line(&raw) {
            return Ok(Some(line));
        }
    }
    Ok(None)
}

/// Scan `high` down to `low` inclusive, one block at a time.
fn scan_backward(
    source: &mut SourceHandle,
    query: &FieldQuery,
    high: usize,
    low: usize,
) -> Result<Option<usize>> {
    let mut block_end = high;
    while block_end >= low {
        let block_start = block_end.saturating_sub(BACKWARD_BLOCK - 1).max(low);
        let lines = source.get_lines(block_start as i64, block_end as i64)?;

        for (offset, raw) in lines.iter().enumerate().rev() {
            if query.matches_line(raw) {
                return Ok(Some(block_start + offset));
            }
        }

        if block_start == low {
            break;
        }
        block_end = block_start - 1;
    }
    Ok(None)
}
