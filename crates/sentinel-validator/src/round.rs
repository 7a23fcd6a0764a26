//! Round state and outcomes.
//!
//! A round is one traversal of
//!
//! ```text
//! Pending → Fetching → Scoring → Aggregating → Validated | Rejected
//! ```
//!
//! Nothing in a round outlives it except the history updates made while
//! scoring.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sentinel_consensus::Cluster;
use sentinel_history::SourceId;
use sentinel_scoring::AnomalyVerdict;
use thiserror::Error;
use tracing::trace;

use crate::error::SourceError;

/// Phase of a validation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoundPhase {
    /// Created, nothing dispatched yet.
    Pending,
    /// Waiting on sources.
    Fetching,
    /// Screening readings against history.
    Scoring,
    /// Looking for agreement among inliers.
    Aggregating,
    /// A value was agreed.
    Validated,
    /// No value for this round.
    Rejected,
}

impl RoundPhase {
    /// Check if the round has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Rejected)
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Fetching => write!(f, "Fetching"),
            Self::Scoring => write!(f, "Scoring"),
            Self::Aggregating => write!(f, "Aggregating"),
            Self::Validated => write!(f, "Validated"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// What happened to one source during a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SourceOutcome {
    /// Reading passed scoring, was recorded in history and sent to consensus.
    Accepted(AnomalyVerdict),
    /// Reading was flagged anomalous and excluded.
    Anomalous(AnomalyVerdict),
    /// Source did not produce a usable reading.
    Unavailable(SourceError),
}

impl SourceOutcome {
    /// Check if the source's reading went on to consensus.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// The anomaly verdict, if the source produced a reading.
    pub fn verdict(&self) -> Option<&AnomalyVerdict> {
        match self {
            Self::Accepted(v) | Self::Anomalous(v) => Some(v),
            Self::Unavailable(_) => None,
        }
    }
}

/// Why a round produced no value.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum RejectionReason {
    /// Every reading was anomalous or missing.
    #[error("no inliers survived scoring ({responded} responded, {anomalous} anomalous)")]
    NoInliers { responded: usize, anomalous: usize },

    /// Too few inlier sources to reach quorum.
    #[error("insufficient quorum: {received} of {required} required sources")]
    InsufficientQuorum { received: usize, required: usize },

    /// Enough inliers, but no cluster reached quorum.
    #[error("inconsistent data: {} clusters, none reached quorum {required}", .clusters.len())]
    InconsistentData {
        clusters: Vec<Cluster>,
        required: usize,
    },
}

/// A value accepted by quorum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedReading {
    /// Round that produced the value.
    pub round: u64,
    /// Agreed value.
    pub value: f64,
    /// Sources in the winning cluster.
    pub supporting: BTreeSet<SourceId>,
    /// Sources that disagreed, either by consensus or by anomaly scoring.
    pub dissenting: BTreeSet<SourceId>,
    /// Sources that produced no usable reading.
    pub unavailable: BTreeSet<SourceId>,
    /// `supporting / total configured sources`.
    pub confidence: f64,
    /// Round start, unix milliseconds.
    pub observed_at: u64,
}

/// A round that produced no value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    /// Round that was rejected.
    pub round: u64,
    /// The specific reason.
    pub reason: RejectionReason,
    /// Per-source outcomes for diagnosis.
    pub outcomes: BTreeMap<SourceId, SourceOutcome>,
    /// Round start, unix milliseconds.
    pub observed_at: u64,
}

/// Final result of a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RoundOutcome {
    /// A value was agreed.
    Validated(ValidatedReading),
    /// No value this round.
    Rejected(Rejection),
}

impl RoundOutcome {
    /// Check if the round validated a value.
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated(_))
    }

    /// The validated reading, if any.
    pub fn validated(&self) -> Option<&ValidatedReading> {
        match self {
            Self::Validated(v) => Some(v),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection, if any.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Validated(_) => None,
            Self::Rejected(r) => Some(r),
        }
    }

    /// The round number.
    pub fn round(&self) -> u64 {
        match self {
            Self::Validated(v) => v.round,
            Self::Rejected(r) => r.round,
        }
    }
}

/// Working state of one round.
#[derive(Debug)]
pub struct ValidationRound {
    number: u64,
    phase: RoundPhase,
    started_at: u64,
    outcomes: BTreeMap<SourceId, SourceOutcome>,
}

impl ValidationRound {
    /// Start a round in the `Pending` phase.
    pub fn new(number: u64, started_at: u64) -> Self {
        Self {
            number,
            phase: RoundPhase::Pending,
            started_at,
            outcomes: BTreeMap::new(),
        }
    }

    /// Round number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Round start, unix milliseconds.
    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    /// Outcomes recorded so far.
    pub fn outcomes(&self) -> &BTreeMap<SourceId, SourceOutcome> {
        &self.outcomes
    }

    /// Move to the next phase.
    pub fn advance(&mut self, next: RoundPhase) {
        trace!(round = self.number, from = %self.phase, to = %next, "Round phase transition");
        self.phase = next;
    }

    /// Record what happened to `source`.
    pub fn record(&mut self, source: SourceId, outcome: SourceOutcome) {
        self.outcomes.insert(source, outcome);
    }

    /// Sources whose readings were flagged anomalous.
    pub fn anomalous_sources(&self) -> BTreeSet<SourceId> {
        self.sources_where(|o| matches!(o, SourceOutcome::Anomalous(_)))
    }

    /// Sources that produced nothing usable.
    pub fn unavailable_sources(&self) -> BTreeSet<SourceId> {
        self.sources_where(|o| matches!(o, SourceOutcome::Unavailable(_)))
    }

    /// Number of sources that produced a reading.
    pub fn responded(&self) -> usize {
        self.outcomes.values().filter(|o| o.verdict().is_some()).count()
    }

    fn sources_where(&self, pred: impl Fn(&SourceOutcome) -> bool) -> BTreeSet<SourceId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| pred(*o))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Finish as validated.
    pub fn validate(
        mut self,
        value: f64,
        supporting: BTreeSet<SourceId>,
        consensus_dissent: BTreeSet<SourceId>,
        total_sources: usize,
    ) -> RoundOutcome {
        self.advance(RoundPhase::Validated);
        let mut dissenting = consensus_dissent;
        dissenting.extend(self.anomalous_sources());
        let confidence = if total_sources == 0 {
            0.0
        } else {
            supporting.len() as f64 / total_sources as f64
        };

        RoundOutcome::Validated(ValidatedReading {
            round: self.number,
            value,
            supporting,
            dissenting,
            unavailable: self.unavailable_sources(),
            confidence,
            observed_at: self.started_at,
        })
    }

    /// Finish as rejected.
    pub fn reject(mut self, reason: RejectionReason) -> RoundOutcome {
        self.advance(RoundPhase::Rejected);
        RoundOutcome::Rejected(Rejection {
            round: self.number,
            reason,
            outcomes: self.outcomes,
            observed_at: self.started_at,
        })
    }
}

/// Cumulative counters across rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidatorStats {
    /// Rounds run.
    pub rounds: u64,
    /// Rounds that validated a value.
    pub validated: u64,
    /// Rounds that were rejected.
    pub rejected: u64,
    /// Source responses missing or unusable.
    pub sources_unavailable: u64,
    /// Readings excluded as anomalous.
    pub anomalies_detected: u64,
}

impl ValidatorStats {
    /// Fold one finished round into the counters.
    pub fn record_outcome(&mut self, outcome: &RoundOutcome) {
        self.rounds += 1;
        match outcome {
            RoundOutcome::Validated(_) => self.validated += 1,
            RoundOutcome::Rejected(_) => self.rejected += 1,
        }
    }

    /// Fraction of rounds that validated.
    pub fn validation_rate(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.validated as f64 / self.rounds as f64
        }
    }
}

impl std::fmt::Display for ValidatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rounds: {} | Validated: {} | Rejected: {} | Unavailable: {} | Anomalies: {}",
            self.rounds,
            self.validated,
            self.rejected,
            self.sources_unavailable,
            self.anomalies_detected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sentinel_history::Reading;

    fn verdict(source: &str, value: f64, is_inlier: bool) -> AnomalyVerdict {
        AnomalyVerdict {
            reading: Reading::new(SourceId::new(source), value, 0).unwrap(),
            score: if is_inlier { 0.0 } else { 0.9 },
            is_inlier,
        }
    }

    #[test]
    fn phase_display() {
        assert_eq!(format!("{}", RoundPhase::Pending), "Pending");
        assert_eq!(format!("{}", RoundPhase::Aggregating), "Aggregating");
        assert_eq!(format!("{}", RoundPhase::Rejected), "Rejected");
        assert!(RoundPhase::Validated.is_terminal());
        assert!(!RoundPhase::Scoring.is_terminal());
    }

    #[test]
    fn validated_round_collects_dissent() {
        let mut round = ValidationRound::new(7, 1_000);
        round.advance(RoundPhase::Fetching);
        round.record(SourceId::new("a"), SourceOutcome::Accepted(verdict("a", 1.0, true)));
        round.record(SourceId::new("b"), SourceOutcome::Anomalous(verdict("b", 9.0, false)));
        round.record(
            SourceId::new("c"),
            SourceOutcome::Unavailable(SourceError::DeadlineElapsed),
        );
        assert_eq!(round.responded(), 2);

        let supporting: BTreeSet<_> = [SourceId::new("a")].into();
        let consensus_dissent: BTreeSet<_> = [SourceId::new("d")].into();
        let outcome = round.validate(1.0, supporting, consensus_dissent, 4);

        let v = outcome.validated().unwrap();
        assert_eq!(v.round, 7);
        assert_eq!(v.confidence, 0.25);
        assert_eq!(v.observed_at, 1_000);
        assert!(v.dissenting.contains(&SourceId::new("b")));
        assert!(v.dissenting.contains(&SourceId::new("d")));
        assert!(v.unavailable.contains(&SourceId::new("c")));
    }

    #[test]
    fn rejected_round_keeps_outcomes() {
        let mut round = ValidationRound::new(3, 0);
        round.record(SourceId::new("a"), SourceOutcome::Anomalous(verdict("a", 9.0, false)));

        let outcome = round.reject(RejectionReason::NoInliers {
            responded: 1,
            anomalous: 1,
        });
        let r = outcome.rejection().unwrap();
        assert_eq!(r.outcomes.len(), 1);
        assert_eq!(outcome.round(), 3);
        assert_eq!(
            r.reason.to_string(),
            "no inliers survived scoring (1 responded, 1 anomalous)"
        );
    }

    #[test]
    fn stats_summary() {
        let mut stats = ValidatorStats::default();
        let rejected = ValidationRound::new(1, 0).reject(RejectionReason::InsufficientQuorum {
            received: 1,
            required: 3,
        });
        stats.record_outcome(&rejected);
        stats.anomalies_detected = 2;

        assert_eq!(stats.validation_rate(), 0.0);
        assert_eq!(
            stats.to_string(),
            "Rounds: 1 | Validated: 0 | Rejected: 1 | Unavailable: 0 | Anomalies: 2"
        );
    }

    proptest! {
        #[test]
        fn validated_round_partitions_sources(kinds in prop::collection::vec(0u8..3, 1..12)) {
            let mut round = ValidationRound::new(1, 0);
            let mut supporting = BTreeSet::new();
            for (i, kind) in kinds.iter().enumerate() {
                let id = format!("s{:02}", i);
                let outcome = match kind {
                    0 => {
                        supporting.insert(SourceId::new(id.as_str()));
                        SourceOutcome::Accepted(verdict(&id, 1.0, true))
                    }
                    1 => SourceOutcome::Anomalous(verdict(&id, 9.0, false)),
                    _ => SourceOutcome::Unavailable(SourceError::DeadlineElapsed),
                };
                round.record(SourceId::new(id.as_str()), outcome);
            }
            let anomalous = round.anomalous_sources();
            let unavailable = round.unavailable_sources();

            let outcome = round.validate(1.0, supporting.clone(), BTreeSet::new(), kinds.len());
            let v = outcome.validated().unwrap();

            prop_assert_eq!(&v.dissenting, &anomalous);
            prop_assert_eq!(&v.unavailable, &unavailable);
            prop_assert!(v.supporting.is_disjoint(&v.dissenting));
            prop_assert_eq!(
                v.supporting.len() + v.dissenting.len() + v.unavailable.len(),
                kinds.len()
            );
            prop_assert!((0.0..=1.0).contains(&v.confidence));
        }
    }
}
