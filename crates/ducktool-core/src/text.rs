//! Text position utilities for line:column and byte offset conversions.
//!
//! ## Coordinate Conventions
//!
//! - Lines and columns are **1-indexed** (matching editor conventions)
//! - Byte offsets are **0-indexed**
//! - Columns count bytes; a `\r` before `\n` belongs to the line it ends

use crate::rewrite::Span;
use crate::types::Selection;

/// Convert a byte offset to 1-indexed line and column.
///
/// If `offset` exceeds content length, returns position at end of content.
pub fn byte_offset_to_position(content: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(content.len());
    let mut line = 1u32;
    let mut col = 1u32;

    for &byte in &content.as_bytes()[..offset] {
        if byte == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Byte offset of the first column of `line`, or `None` past the last line.
pub fn line_start_offset(content: &str, line: u32) -> Option<usize> {
    if line == 0 {
        return None;
    }
    if line == 1 {
        return Some(0);
    }
    content
        .match_indices('\n')
        .nth(line as usize - 2)
        .map(|(i, _)| i + 1)
}

/// The text of `line` without its line terminator.
pub fn line_text(content: &str, line: u32) -> Option<&str> {
    let start = line_start_offset(content, line)?;
    let rest = &content[start..];
    let end = rest.find('\n').unwrap_or(rest.len());
    Some(rest[..end].trim_end_matches('\r'))
}

/// Number of lines in `content`. An empty string has one (empty) line.
pub fn line_count(content: &str) -> u32 {
    content.matches('\n').count() as u32 + 1
}

/// Convert a 1-indexed line and column to a byte offset.
///
/// Returns `None` if the line does not exist or the column lies beyond one
/// past the end of the line.
pub fn position_to_byte_offset(content: &str, line: u32, col: u32) -> Option<usize> {
    if col == 0 {
        return None;
    }
    let start = line_start_offset(content, line)?;
    let text = line_text(content, line)?;
    let within = col as usize - 1;
    if within > text.len() {
        return None;
    }
    Some(start + within)
}

/// Convert a selection to the byte span it covers in `content`.
pub fn selection_to_span(content: &str, selection: &Selection) -> Option<Span> {
    let start = position_to_byte_offset(content, selection.start_line, selection.start_column)?;
    let end = position_to_byte_offset(content, selection.end_line, selection.end_column)?;
    if end < start {
        return None;
    }
    Some(Span::new(start, end))
}

/// The text covered by `selection`, if it is within bounds.
pub fn selected_text<'a>(content: &'a str, selection: &Selection) -> Option<&'a str> {
    let span = selection_to_span(content, selection)?;
    content.get(span.start..span.end)
}

/// The line terminator used by `content` (`\r\n` when any line uses it).
pub fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}
