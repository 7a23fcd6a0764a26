//! Error types for sentinel-scoring.

use thiserror::Error;

/// Result type for scorer construction.
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Invalid scorer configuration. Scoring itself never fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// The ensemble needs at least one tree.
    #[error("ensemble must contain at least one tree")]
    NoTrees,

    /// Sub-samples need at least two values to partition.
    #[error("max_samples must be at least 2, got {0}")]
    SampleTooSmall(usize),

    /// Threshold must lie strictly between 0 and 1.
    #[error("contamination threshold must be in (0, 1), got {0}")]
    InvalidThreshold(f64),
}
