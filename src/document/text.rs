//! Text utilities for position conversion.
//!
//! Provides byte offset <-> LSP position conversion with proper UTF-16 handling
//! and line slicing for the tokenizers.

use std::ops::Range;

use tower_lsp::lsp_types::{Position, Range as LspRange};

/// Pre-computed line index for efficient position lookups.
///
/// LSP positions use line/column where column is in UTF-16 code units.
/// Line starts are computed once so lookups are O(log n).
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line starts.
    line_starts: Vec<usize>,
    source: String,
}

impl LineIndex {
    pub fn new(source: String) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            line_starts,
            source,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of lines. A trailing newline starts an empty last line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset of the start of `line`.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    /// Byte range of `line`, without its line terminator.
    pub fn line_range(&self, line: usize) -> Option<Range<usize>> {
        let start = *self.line_starts.get(line)?;
        let mut end = self
            .line_starts
            .get(line + 1)
            .map(|&next| next - 1)
            .unwrap_or(self.source.len());
        if end > start && self.source.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        Some(start..end)
    }

    /// Text of `line`, without its line terminator.
    pub fn line(&self, line: usize) -> Option<&str> {
        self.line_range(line).map(|range| &self.source[range])
    }

    /// Every line, without terminators.
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.line_count()).filter_map(|line| self.line(line))
    }

    /// Convert a byte offset to an LSP position.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let line_start = self.line_starts[line];
        let col: u32 = self.source[line_start..offset]
            .chars()
            .map(|c| c.len_utf16() as u32)
            .sum();

        Position::new(line as u32, col)
    }

    /// Convert an LSP position to a byte offset.
    ///
    /// Returns None if the line is out of bounds; columns past the end of the
    /// line clamp to the end.
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let range = self.line_range(position.line as usize)?;
        let line_slice = &self.source[range.clone()];

        let mut utf16_col = 0u32;
        for (i, c) in line_slice.char_indices() {
            if utf16_col >= position.character {
                return Some(range.start + i);
            }
            utf16_col += c.len_utf16() as u32;
        }

        Some(range.end)
    }

    pub fn span_to_range(&self, span: &Range<usize>) -> LspRange {
        LspRange::new(
            self.offset_to_position(span.start),
            self.offset_to_position(span.end),
        )
    }

    /// Convert an LSP range to a byte span.
    pub fn range_to_span(&self, range: LspRange) -> Option<Range<usize>> {
        let start = self.position_to_offset(range.start)?;
        let end = self.position_to_offset(range.end)?;
        Some(start..end.max(start))
    }
}
