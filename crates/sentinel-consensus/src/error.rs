//! Error types for sentinel-consensus.

use thiserror::Error;

/// Result type for consensus policy construction.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Invalid consensus policy. Aggregation itself never fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    /// Agreement among fewer than two sources is not consensus.
    #[error("quorum must be at least {min}, got {quorum}")]
    QuorumTooSmall { quorum: usize, min: usize },

    /// Tolerance must be finite and strictly positive.
    #[error("tolerance must be finite and > 0, got {0}")]
    InvalidTolerance(f64),
}
