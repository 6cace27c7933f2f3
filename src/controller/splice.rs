//! Line-range replacement over file content.
//!
//! Content is treated as `'\n'`-separated segments, so a trailing newline is
//! an empty last segment and bytes outside the edited ranges survive exactly.

use crate::context::{IntendedEdit, LineRange};

/// Number of `'\n'`-separated segments; an empty file has one.
pub fn segment_count(content: &str) -> usize {
    content.split('\n').count()
}

/// The full-read range of `content`.
pub fn full_range(content: &str) -> LineRange {
    LineRange::new(1, segment_count(content))
}

/// Text of `range` within `content`, or `None` when the range runs past the end.
pub fn extract(content: &str, range: &LineRange) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    if !range.is_valid() || range.end > lines.len() {
        return None;
    }
    Some(lines[range.start - 1..range.end].join("\n"))
}

/// Apply `edits` (non-overlapping, all against the same original content).
/// Edits are applied from the highest start line down so earlier ranges keep
/// their meaning. Edits without `new_content` are skipped.
pub fn apply(content: &str, edits: &[&IntendedEdit]) -> Result<String, String> {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    let original_len = lines.len();

    let mut ordered: Vec<&IntendedEdit> = edits
        .iter()
        .copied()
        .filter(|e| e.is_applicable())
        .collect();
    ordered.sort_by(|a, b| b.range.start.cmp(&a.range.start));

    for edit in ordered {
        let range = edit.range;
        if !range.is_valid() || range.end > original_len {
            return Err(format!(
                "range {range} is outside the file ({original_len} lines)"
            ));
        }
        let replacement = edit.new_content.as_deref().unwrap_or_default();
        let new_lines = replacement.split('\n').map(str::to_string);
        lines.splice(range.start - 1..range.end, new_lines);
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(start: usize, end: usize, content: &str) -> IntendedEdit {
        IntendedEdit::new("a.txt", LineRange::new(start, end), "test").with_content(content)
    }

    const FIVE: &str = "line1\nline2\nline3\nline4\nline5";

    #[test]
    fn test_replace_middle_range() {
        let e = edit(2, 3, "X\nY");
        let out = apply(FIVE, &[&e]).unwrap();
        assert_eq!(out, "line1\nX\nY\nline4\nline5");
    }

    #[test]
    fn test_multiple_edits_refer_to_original_lines() {
        let a = edit(1, 1, "A");
        let b = edit(4, 5, "B1\nB2\nB3");
        // Order given does not matter.
        let out = apply(FIVE, &[&a, &b]).unwrap();
        assert_eq!(out, "A\nline2\nline3\nB1\nB2\nB3");
    }

    #[test]
    fn test_shrinking_edit() {
        let e = edit(2, 4, "only");
        assert_eq!(apply(FIVE, &[&e]).unwrap(), "line1\nonly\nline5");
    }

    #[test]
    fn test_trailing_newline_and_crlf_preserved() {
        let content = "a\r\nb\r\nc\r\n";
        let e = edit(2, 2, "B\r");
        assert_eq!(apply(content, &[&e]).unwrap(), "a\r\nB\r\nc\r\n");
    }

    #[test]
    fn test_no_content_edit_is_skipped() {
        let noop = IntendedEdit::new("a.txt", LineRange::new(1, 1), "noop");
        assert_eq!(apply(FIVE, &[&noop]).unwrap(), FIVE);
    }

    #[test]
    fn test_out_of_range_is_error() {
        let e = edit(5, 6, "x");
        assert!(apply(FIVE, &[&e]).is_err());
    }

    #[test]
    fn test_counts_and_extract() {
        assert_eq!(segment_count(""), 1);
        assert_eq!(segment_count("a\nb\n"), 3);
        assert_eq!(full_range(FIVE), LineRange::new(1, 5));
        assert_eq!(extract(FIVE, &LineRange::new(2, 3)).as_deref(), Some("line2\nline3"));
        assert_eq!(extract(FIVE, &LineRange::new(4, 9)), None);
    }
}
