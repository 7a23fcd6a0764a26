//! Error types for sentinel-history.

use thiserror::Error;

use crate::reading::SourceId;

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors raised while building readings or mutating a history window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    /// Reading value is NaN or infinite.
    #[error("reading from {source_id} is not finite: {value}")]
    NonFiniteValue { source_id: SourceId, value: f64 },

    /// A reading was offered to the window of a different source.
    #[error("reading from {actual} does not belong to history of {expected}")]
    SourceMismatch { expected: SourceId, actual: SourceId },

    /// A window must hold at least one reading.
    #[error("history capacity must be at least 1")]
    ZeroCapacity,
}
