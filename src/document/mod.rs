//! Document state and text utilities.
//!
//! This module provides:
//! - `LineIndex` for byte offset <-> LSP position conversion
//! - `Document`, a text buffer that is either *live* (backed by a buffer the
//!   host has open) or *projected* (an immutable snapshot read from disk)
//! - `DocumentStore` and `ProjectedCache` for document lifecycle management

mod store;
mod text;

pub use store::{DocumentStore, ProjectedCache};
pub use text::LineIndex;

use std::ops::Range;
use std::path::PathBuf;

use tower_lsp::lsp_types::Position;

/// Where a document's text came from.
#[derive(Debug, Clone)]
pub enum DocumentOrigin {
    /// An open, host-owned buffer; `version` is the client's document version.
    Live { version: i32 },
    /// A read-only snapshot lazily loaded from a file path.
    Projected { path: PathBuf },
}

/// An addressable text buffer with line/offset conversion.
///
/// Indexed once at construction; the text of a projected document never
/// changes, and a live document is replaced wholesale on every change
/// notification.
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    line_index: LineIndex,
    origin: DocumentOrigin,
}

impl Document {
    /// Create a document backed by an open buffer.
    pub fn live(text: String, version: i32) -> Self {
        let line_index = LineIndex::new(&text);
        Self {
            text,
            line_index,
            origin: DocumentOrigin::Live { version },
        }
    }

    /// Create an immutable snapshot of a file's contents.
    pub fn projected(text: String, path: PathBuf) -> Self {
        let line_index = LineIndex::new(&text);
        Self {
            text,
            line_index,
            origin: DocumentOrigin::Projected { path },
        }
    }

    /// The full document text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Slice the text at a byte range, `None` if out of bounds or not on
    /// char boundaries.
    pub fn slice(&self, range: Range<usize>) -> Option<&str> {
        self.text.get(range)
    }

    pub fn origin(&self) -> &DocumentOrigin {
        &self.origin
    }

    /// Client version for live documents; projected snapshots have none.
    pub fn version(&self) -> Option<i32> {
        match self.origin {
            DocumentOrigin::Live { version } => Some(version),
            DocumentOrigin::Projected { .. } => None,
        }
    }

    /// Byte offset for an LSP position, `None` if the line is out of bounds.
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        self.line_index.offset_at(&self.text, position)
    }

    /// LSP position for a byte offset.
    pub fn position_at(&self, offset: usize) -> Position {
        self.line_index.position_at(&self.text, offset)
    }

    /// LSP range for a byte span.
    pub fn span_to_range(&self, span: &Range<usize>) -> tower_lsp::lsp_types::Range {
        self.line_index.span_to_range(&self.text, span)
    }
}
