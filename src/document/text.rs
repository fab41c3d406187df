//! Byte offset <-> LSP position conversion.
//!
//! LSP positions use line/column where column is in UTF-16 code units. The
//! index pre-computes line start offsets so lookups are O(log n); the source
//! text itself lives in the owning [`Document`](super::Document) and is
//! borrowed per call.

use tower_lsp::lsp_types::Position;

/// Pre-computed line starts for a piece of text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line starts.
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Build a line index for the given text.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in text.char_indices() {
            if c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset into a line/UTF-16-column position.
    ///
    /// `text` must be the text the index was built from.
    pub fn position_at(&self, text: &str, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(text.len());

        let mut col = 0u32;
        for (i, c) in text[line_start..line_end].char_indices() {
            if line_start + i >= offset {
                break;
            }
            col += c.len_utf16() as u32;
        }

        Position::new(line as u32, col)
    }

    /// Convert a line/UTF-16-column position into a byte offset.
    ///
    /// Returns `None` if the line is out of bounds; a column past the end of
    /// its line clamps to the end of the line.
    pub fn offset_at(&self, text: &str, position: Position) -> Option<usize> {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return None;
        }

        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|&end| end.saturating_sub(1)) // exclude the newline
            .unwrap_or(text.len());

        let mut utf16_col = 0u32;
        for (i, c) in text[line_start..line_end].char_indices() {
            if utf16_col >= position.character {
                return Some(line_start + i);
            }
            utf16_col += c.len_utf16() as u32;
        }

        Some(line_end.min(text.len()))
    }

    /// Convert a byte span to an LSP range.
    pub fn span_to_range(
        &self,
        text: &str,
        span: &std::ops::Range<usize>,
    ) -> tower_lsp::lsp_types::Range {
        let start = self.position_at(text, span.start);
        let end = self.position_at(text, span.end);
        tower_lsp::lsp_types::Range::new(start, end)
    }
}
