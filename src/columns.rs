//! Column discovery for table views.

use std::collections::HashSet;

use crate::error::Result;
use crate::record;
use crate::source::SourceHandle;

/// Up to `max` lines spread evenly across the source, in file order.
///
/// Small sources are returned whole.
pub fn sample_lines(source: &mut SourceHandle, max: usize) -> Result<Vec<(usize, String)>> {
    let total = source.line_count()?;
    if total == 0 || max == 0 {
        return Ok(Vec::new());
    }
    if total <= max {
        let lines = source.get_lines(1, total as i64)?;
        return Ok((1..).zip(lines).collect());
    }

    let step = total as f64 / max as f64;
    let mut sample = Vec::with_capacity(max);
    for i in 0..max {
        let line = 1 + (i as f64 * step) as usize;
        if let Some(raw) = source.get_lines(line as i64, line as i64)?.pop() {
            sample.push((line, raw));
        }
    }
    Ok(sample)
}

/// Flattened field paths of the sampled records, in first-seen order.
///
/// Lines that are not valid records contribute nothing.
pub fn discover_columns(source: &mut SourceHandle, max: usize) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for (_, raw) in sample_lines(source, max)? {
        let record = record::parse(&raw);
        if !record.is_valid() {
            continue;
        }
        for key in record::flatten(&record).into_keys() {
            if seen.insert(key.clone()) {
                columns.push(key);
            }
        }
    }
    Ok(columns)
}
