//! Quorum consensus over inlier readings.
//!
//! Readings that survived anomaly scoring are grouped into tolerance bands.
//! The strongest band wins, and its mean becomes the agreed value, but only
//! if enough distinct sources stand behind it.
//!
//! # Banding
//!
//! Every cluster satisfies `max - min <= tolerance`, so all pairwise
//! differences inside a cluster are within tolerance, and two readings more
//! than `tolerance` apart never share a cluster. Clusters are carved out
//! greedily: the fullest window `[v, v + tolerance]` first, then the fullest
//! window of what is left, until nothing remains.
//!
//! # Winner selection
//!
//! Deterministic, independent of input order:
//!
//! ```text
//! most members → smallest mean absolute deviation → earliest first observation → lowest mean
//! ```
//!
//! # Quorum
//!
//! - fewer than `quorum` distinct sources responded → `InsufficientQuorum`
//! - winner backed by fewer than `quorum` sources → `InconsistentData`
//! - otherwise → `Agreed`

mod aggregator;
mod banding;
mod error;
mod quorum;

pub use aggregator::{aggregate, Agreement, ConsensusAggregator, ConsensusVerdict};
pub use banding::{band, Cluster};
pub use error::{ConsensusError, Result};
pub use quorum::{majority_quorum, meets_quorum, sources_needed, QuorumPolicy, MIN_QUORUM};
