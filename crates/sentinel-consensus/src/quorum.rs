//! Quorum policy and threshold arithmetic.
//!
//! A quorum of one is an echo, not agreement, so the floor is two.

use serde::Serialize;

use crate::error::{ConsensusError, Result};

/// Smallest quorum that still means agreement.
pub const MIN_QUORUM: usize = 2;

/// Simple-majority quorum for `total` configured sources, never below [`MIN_QUORUM`].
///
/// # Examples
///
/// ```
/// use sentinel_consensus::majority_quorum;
///
/// assert_eq!(majority_quorum(1), 2);  // Floor
/// assert_eq!(majority_quorum(5), 3);  // 3 of 5
/// assert_eq!(majority_quorum(8), 5);  // 5 of 8
/// ```
pub const fn majority_quorum(total: usize) -> usize {
    let majority = total / 2 + 1;
    if majority < MIN_QUORUM {
        MIN_QUORUM
    } else {
        majority
    }
}

/// Check if a supporting-source count meets the quorum.
pub const fn meets_quorum(supporting: usize, quorum: usize) -> bool {
    supporting >= quorum
}

/// How many more agreeing sources are needed to reach quorum.
pub const fn sources_needed(supporting: usize, quorum: usize) -> usize {
    quorum.saturating_sub(supporting)
}

/// Validated quorum and tolerance pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuorumPolicy {
    quorum: usize,
    tolerance: f64,
}

impl QuorumPolicy {
    /// Create a policy, rejecting quorums below two and non-positive tolerances.
    pub fn new(quorum: usize, tolerance: f64) -> Result<Self> {
        if quorum < MIN_QUORUM {
            return Err(ConsensusError::QuorumTooSmall {
                quorum,
                min: MIN_QUORUM,
            });
        }
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ConsensusError::InvalidTolerance(tolerance));
        }
        Ok(Self { quorum, tolerance })
    }

    /// Minimum number of agreeing sources.
    pub const fn quorum(&self) -> usize {
        self.quorum
    }

    /// Maximum spread within one cluster.
    pub const fn tolerance(&self) -> f64 {
        self.tolerance
    }
}
