pub mod window;

pub use window::{iter_range, read_one, read_range, LineIter};

/// Clamp a signed 1-based request to `1..=total`.
///
/// `start = max(1, min(start, total))`, `end = max(start, min(end, total))`.
/// Returns `None` for an empty source.
pub(crate) fn clamp_range(start: i64, end: i64, total: usize) -> Option<(usize, usize)> {
    if total == 0 {
        return None;
    }
    let total = total as i64;
    let start = start.min(total).max(1);
    let end = end.min(total).max(start);
    Some((start as usize, end as usize))
}

/// Remove a trailing `\n` or `\r\n`.
pub(crate) fn strip_terminator(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(-5, 1_000_000_000, 100), Some((1, 100)));
        assert_eq!(clamp_range(10, 20, 100), Some((10, 20)));
        assert_eq!(clamp_range(20, 10, 100), Some((20, 20)));
        assert_eq!(clamp_range(150, 200, 100), Some((100, 100)));
        assert_eq!(clamp_range(0, 0, 100), Some((1, 1)));
        assert_eq!(clamp_range(1, 10, 0), None);
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator("a\n".to_string()), "a");
        assert_eq!(strip_terminator("a\r\n".to_string()), "a");
        assert_eq!(strip_terminator("a".to_string()), "a");
        assert_eq!(strip_terminator("a\r".to_string()), "a\r");
    }
}
