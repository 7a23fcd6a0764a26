//! Isolation-based anomaly scoring.
//!
//! A source is judged against its own track record. The scorer builds an
//! ensemble of random partitioning trees over the values in the source's
//! history window and measures how quickly a new reading gets isolated.
//!
//! # Scoring
//!
//! - Few cuts to isolate → the reading sits far from the baseline → high score
//! - Many cuts to isolate → the reading is buried in the baseline → low score
//!
//! The reference depth `D` is taken from the history itself: each window
//! value is scored against the rest, and the shallowest mean depth marks the
//! most isolated value the source has already reported. A reading as hard
//! to isolate as that scores 0:
//!
//! ```text
//! score = clamp(1 - E[h(x)] / D, 0, 1)
//! ```
//!
//! A reading is an inlier when `score < contamination_threshold`, i.e. it
//! must not isolate more than that fraction faster than `D`. With fewer
//! than `warmup_min` historical readings there is no baseline and every
//! reading is an inlier with score 0.
//!
//! Scoring never mutates history. The caller decides what to record.

mod depth;
mod error;
mod scorer;

pub use depth::{average_path_length, isolation_depth};
pub use error::{Result, ScoringError};
pub use scorer::{AnomalyScorer, AnomalyVerdict, ScorerConfig};
