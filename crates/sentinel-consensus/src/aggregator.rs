//! Consensus aggregation over one round's inlier readings.

use std::collections::BTreeSet;

use serde::Serialize;
use sentinel_history::{Reading, SourceId};
use tracing::debug;

use crate::banding::{band, Cluster};
use crate::error::Result;
use crate::quorum::{meets_quorum, QuorumPolicy};

/// An accepted consensus value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agreement {
    /// Mean of the winning cluster.
    pub agreed_value: f64,
    /// Sources in the winning cluster.
    pub supporting: BTreeSet<SourceId>,
    /// Sources that responded with an inlier outside the winning cluster.
    pub dissenting: BTreeSet<SourceId>,
    /// The winning cluster itself.
    pub cluster: Cluster,
}

/// Result of one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConsensusVerdict {
    /// A cluster backed by at least `quorum` sources.
    Agreed(Agreement),
    /// Fewer distinct sources responded than the quorum requires.
    InsufficientQuorum { received: usize, required: usize },
    /// Enough sources responded but no cluster reached quorum.
    /// Every cluster is kept for diagnosis, strongest first.
    InconsistentData {
        clusters: Vec<Cluster>,
        required: usize,
    },
}

impl ConsensusVerdict {
    /// Check if consensus was reached.
    pub fn is_agreed(&self) -> bool {
        matches!(self, ConsensusVerdict::Agreed(_))
    }

    /// The agreed value, if any.
    pub fn agreed_value(&self) -> Option<f64> {
        match self {
            ConsensusVerdict::Agreed(agreement) => Some(agreement.agreed_value),
            _ => None,
        }
    }
}

/// Aggregate inlier readings under `policy`.
///
/// Pure: the verdict depends only on the readings and the policy, not on the
/// order readings are supplied in.
pub fn aggregate(readings: &[Reading], policy: &QuorumPolicy) -> ConsensusVerdict {
    let required = policy.quorum();
    let respondents: BTreeSet<SourceId> = readings.iter().map(|r| r.source().clone()).collect();

    if !meets_quorum(respondents.len(), required) {
        debug!(
            received = respondents.len(),
            required, "Too few respondents for quorum"
        );
        return ConsensusVerdict::InsufficientQuorum {
            received: respondents.len(),
            required,
        };
    }

    let mut clusters = band(readings, policy.tolerance());
    clusters.sort_by(Cluster::strength_cmp);

    let winner_sources = match clusters.first() {
        Some(winner) => winner.sources(),
        None => BTreeSet::new(),
    };

    if !meets_quorum(winner_sources.len(), required) {
        debug!(
            clusters = clusters.len(),
            largest = winner_sources.len(),
            required,
            "No cluster reached quorum"
        );
        return ConsensusVerdict::InconsistentData { clusters, required };
    }

    let cluster = clusters.swap_remove(0);
    let dissenting = respondents
        .difference(&winner_sources)
        .cloned()
        .collect::<BTreeSet<_>>();

    debug!(
        agreed_value = cluster.mean(),
        supporting = winner_sources.len(),
        dissenting = dissenting.len(),
        "Consensus reached"
    );

    ConsensusVerdict::Agreed(Agreement {
        agreed_value: cluster.mean(),
        supporting: winner_sources,
        dissenting,
        cluster,
    })
}

/// Aggregator bound to a fixed policy.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusAggregator {
    policy: QuorumPolicy,
}

impl ConsensusAggregator {
    /// Create an aggregator for the given quorum and tolerance.
    pub fn new(quorum: usize, tolerance: f64) -> Result<Self> {
        Ok(Self {
            policy: QuorumPolicy::new(quorum, tolerance)?,
        })
    }

    /// Create an aggregator from an existing policy.
    pub fn with_policy(policy: QuorumPolicy) -> Self {
        Self { policy }
    }

    /// The active policy.
    pub fn policy(&self) -> &QuorumPolicy {
        &self.policy
    }

    /// Aggregate inlier readings.
    pub fn aggregate(&self, readings: &[Reading]) -> ConsensusVerdict {
        aggregate(readings, &self.policy)
    }
}
