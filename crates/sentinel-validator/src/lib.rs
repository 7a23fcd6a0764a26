//! Integrity validation rounds.
//!
//! An [`IntegrityValidator`] owns a set of [`SourceBinding`]s and one
//! history window per source. Each round it:
//!
//! 1. fetches a reading from every source in parallel, under a per-source
//!    timeout and an overall round deadline
//! 2. scores each reading against its own source's history and drops outliers
//! 3. asks the consensus aggregator for a quorum-backed value
//!
//! The result is a [`RoundOutcome`], handed to every subscribed [`Publisher`].
//!
//! ```text
//! sources ─fetch─► readings ─score─► inliers ─aggregate─► outcome ─► publishers
//!                                 │
//!                                 └─► history (inliers only)
//! ```

mod config;
mod error;
mod gateway;
mod publish;
mod round;
mod validator;

pub use config::ValidatorConfig;
pub use error::{Error, Result, SourceError};
pub use gateway::{SourceBinding, SourceGateway};
pub use publish::{ChannelPublisher, LogPublisher, Publisher};
pub use round::{
    Rejection, RejectionReason, RoundOutcome, RoundPhase, SourceOutcome, ValidatedReading,
    ValidationRound, ValidatorStats,
};
pub use validator::IntegrityValidator;

pub use sentinel_consensus::{Agreement, Cluster, ConsensusVerdict};
pub use sentinel_history::{now_millis, HistoryStore, Reading, SourceId};
pub use sentinel_scoring::AnomalyVerdict;
