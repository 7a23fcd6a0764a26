//! Validator configuration.

use std::time::Duration;

use sentinel_consensus::QuorumPolicy;
use sentinel_scoring::ScorerConfig;

use crate::error::{Error, Result};

/// Configuration for an [`IntegrityValidator`](crate::IntegrityValidator).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// History capacity per source.
    pub window_size: usize,

    /// History length below which every reading is accepted unscored.
    pub warmup_min: usize,

    /// Anomaly score at or above which a reading is an outlier.
    pub contamination_threshold: f64,

    /// Minimum number of agreeing sources.
    pub quorum: usize,

    /// Maximum spread between readings that count as the same value.
    pub tolerance: f64,

    /// Wall-clock budget for the whole fetch phase.
    pub round_deadline: Duration,

    /// Budget for a single source, nested inside the round deadline.
    pub per_source_timeout: Duration,

    /// Isolation trees per score.
    pub trees: usize,

    /// History values drawn into each tree.
    pub max_samples: usize,

    /// Seed for the scorer's random generator.
    pub seed: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        let scorer = ScorerConfig::default();
        Self {
            window_size: 100,
            warmup_min: scorer.warmup_min,
            contamination_threshold: scorer.contamination_threshold,
            quorum: 3,
            tolerance: 0.01,
            round_deadline: Duration::from_secs(5),
            per_source_timeout: Duration::from_secs(2),
            trees: scorer.trees,
            max_samples: scorer.max_samples,
            seed: scorer.seed,
        }
    }
}

impl ValidatorConfig {
    /// Set the per-source history capacity.
    #[must_use]
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the warm-up minimum.
    #[must_use]
    pub fn with_warmup_min(mut self, warmup_min: usize) -> Self {
        self.warmup_min = warmup_min;
        self
    }

    /// Set the outlier threshold.
    #[must_use]
    pub fn with_contamination_threshold(mut self, threshold: f64) -> Self {
        self.contamination_threshold = threshold;
        self
    }

    /// Set the quorum.
    #[must_use]
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum;
        self
    }

    /// Set the agreement tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the round deadline.
    #[must_use]
    pub fn with_round_deadline(mut self, deadline: Duration) -> Self {
        self.round_deadline = deadline;
        self
    }

    /// Set the per-source timeout.
    #[must_use]
    pub fn with_per_source_timeout(mut self, timeout: Duration) -> Self {
        self.per_source_timeout = timeout;
        self
    }

    /// Set the scorer seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the ensemble size.
    #[must_use]
    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    /// Per-source timeout clamped to the round deadline.
    pub fn effective_source_timeout(&self) -> Duration {
        self.per_source_timeout.min(self.round_deadline)
    }

    /// Scorer settings derived from this configuration.
    pub fn scorer_config(&self) -> ScorerConfig {
        ScorerConfig {
            trees: self.trees,
            max_samples: self.max_samples,
            warmup_min: self.warmup_min,
            contamination_threshold: self.contamination_threshold,
            seed: self.seed,
        }
    }

    /// Quorum policy derived from this configuration.
    pub fn quorum_policy(&self) -> Result<QuorumPolicy> {
        Ok(QuorumPolicy::new(self.quorum, self.tolerance)?)
    }

    /// Check every value is in range.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window_size must be at least 1".into()));
        }
        if self.warmup_min > self.window_size {
            return Err(Error::InvalidConfig(format!(
                "warmup_min {} exceeds window_size {}",
                self.warmup_min, self.window_size
            )));
        }
        if self.round_deadline.is_zero() {
            return Err(Error::InvalidConfig("round_deadline must be non-zero".into()));
        }
        if self.per_source_timeout.is_zero() {
            return Err(Error::InvalidConfig("per_source_timeout must be non-zero".into()));
        }
        self.scorer_config().validate()?;
        self.quorum_policy()?;
        Ok(())
    }
}
