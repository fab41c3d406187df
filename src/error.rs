//! Error type shared across the preview pipeline.

use thiserror::Error;

/// Failure modes of a preview request.
///
/// Structural misses (no math at the position, unknown label) are not errors;
/// those surface as `Preview::Unavailable` at the coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreviewError {
    /// The typesetting engine rejected the source; the message is the
    /// engine's diagnostic, suitable for display.
    #[error("typesetting failed: {0}")]
    Render(String),

    /// The request's cancellation token fired before a result was produced.
    #[error("request cancelled")]
    Cancelled,

    /// The render pool has shut down and can no longer accept work.
    #[error("render pool closed")]
    PoolClosed,
}

impl PreviewError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PreviewError::Cancelled)
    }
}
