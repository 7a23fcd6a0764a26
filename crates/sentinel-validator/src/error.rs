//! Error types for sentinel-validator.

use std::time::Duration;

use serde::Serialize;
use sentinel_consensus::ConsensusError;
use sentinel_history::{HistoryError, SourceId};
use sentinel_scoring::ScoringError;
use thiserror::Error;

/// Result type for sentinel-validator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or configuring a validator.
///
/// Running a round never fails; problems inside a round end up in the
/// round outcome instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A validator needs at least one source.
    #[error("no sources configured")]
    NoSources,

    /// The same source id was bound twice.
    #[error("source {0} configured more than once")]
    DuplicateSource(SourceId),

    /// The source id is not bound to this validator.
    #[error("unknown source {0}")]
    UnknownSource(SourceId),

    /// Scorer configuration was rejected.
    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// Quorum policy was rejected.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// History window could not be built or seeded.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Why a source contributed nothing to a round.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum SourceError {
    /// The gateway reported a failure.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The per-source timeout fired.
    #[error("source timed out after {0:?}")]
    TimedOut(Duration),

    /// The round deadline fired before the source answered.
    #[error("round deadline elapsed before source responded")]
    DeadlineElapsed,

    /// The gateway returned a value that cannot form a reading.
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// The reading carried another source's id.
    #[error("reading attributed to {actual}, expected {expected}")]
    WrongSource { expected: SourceId, actual: SourceId },

    /// The fetch task panicked.
    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

impl From<HistoryError> for SourceError {
    fn from(e: HistoryError) -> Self {
        SourceError::InvalidReading(e.to_string())
    }
}
