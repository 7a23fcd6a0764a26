//! Ensemble anomaly scorer.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sentinel_history::Reading;
use tracing::{trace, warn};

use crate::depth::isolation_depth;
use crate::error::{Result, ScoringError};

/// Configuration for the isolation ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerConfig {
    /// Number of random partitioning trees in the ensemble.
    pub trees: usize,

    /// Upper bound on history values drawn into each tree.
    pub max_samples: usize,

    /// Minimum history length before scoring is meaningful.
    /// Below it every reading is an inlier with score 0.
    pub warmup_min: usize,

    /// Readings scoring at or above this are outliers. A score of 0.1 means
    /// the reading isolates 10% faster than the most isolated history value.
    pub contamination_threshold: f64,

    /// Seed for the default random generator.
    pub seed: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            max_samples: 256,
            warmup_min: 10,
            contamination_threshold: 0.1,
            seed: 0x5e47_1e11,
        }
    }
}

impl ScorerConfig {
    /// Set the ensemble size.
    #[must_use]
    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    /// Set the per-tree sample bound.
    #[must_use]
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
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

    /// Set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.trees == 0 {
            return Err(ScoringError::NoTrees);
        }
        if self.max_samples < 2 {
            return Err(ScoringError::SampleTooSmall(self.max_samples));
        }
        let t = self.contamination_threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(ScoringError::InvalidThreshold(t));
        }
        Ok(())
    }
}

/// Outcome of scoring one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyVerdict {
    /// The scored reading.
    pub reading: Reading,
    /// Anomaly score in `[0, 1]`; higher is more anomalous.
    pub score: f64,
    /// Whether the reading may be accepted into history and consensus.
    pub is_inlier: bool,
}

impl AnomalyVerdict {
    fn warmup(reading: &Reading) -> Self {
        Self {
            reading: reading.clone(),
            score: 0.0,
            is_inlier: true,
        }
    }

    /// Inverse of `is_inlier`.
    pub fn is_outlier(&self) -> bool {
        !self.is_inlier
    }
}

/// Isolation-ensemble anomaly scorer.
///
/// Stateless apart from its configuration: history is passed in on every
/// call and never modified.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    config: ScorerConfig,
}

impl AnomalyScorer {
    /// Create a scorer after validating its configuration.
    pub fn new(config: ScorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score `candidate` against `history` with the configured seed.
    ///
    /// Identical inputs always give identical verdicts.
    pub fn score<'a, I>(&self, history: I, candidate: &Reading) -> AnomalyVerdict
    where
        I: IntoIterator<Item = &'a Reading>,
    {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.score_with_rng(history, candidate, &mut rng)
    }

    /// Score `candidate` using an injected random generator.
    pub fn score_with_rng<'a, I, R>(
        &self,
        history: I,
        candidate: &Reading,
        rng: &mut R,
    ) -> AnomalyVerdict
    where
        I: IntoIterator<Item = &'a Reading>,
        R: Rng + ?Sized,
    {
        let mut foreign = 0usize;
        let baseline: Vec<f64> = history
            .into_iter()
            .filter(|r| {
                let same = r.source() == candidate.source();
                if !same {
                    foreign += 1;
                }
                same
            })
            .map(Reading::value)
            .collect();

        if foreign > 0 {
            warn!(
                source = %candidate.source(),
                foreign,
                "Ignoring readings from other sources in history"
            );
        }

        if baseline.len() < self.config.warmup_min {
            trace!(
                source = %candidate.source(),
                history = baseline.len(),
                warmup_min = self.config.warmup_min,
                "Insufficient baseline, accepting reading"
            );
            return AnomalyVerdict::warmup(candidate);
        }

        let reference = self.shallowest_history_depth(&baseline, rng);
        if !(reference.is_finite() && reference > 0.0) {
            return AnomalyVerdict::warmup(candidate);
        }

        let mean_depth = self.mean_depth(&baseline, candidate.value(), rng);
        let score = (1.0 - mean_depth / reference).clamp(0.0, 1.0);
        let is_inlier = score < self.config.contamination_threshold;

        trace!(
            source = %candidate.source(),
            value = candidate.value(),
            mean_depth,
            reference,
            score,
            is_inlier,
            "Scored reading"
        );

        AnomalyVerdict {
            reading: candidate.clone(),
            score,
            is_inlier,
        }
    }

    /// Ensemble mean of the candidate's isolation depth against `values`.
    fn mean_depth<R: Rng + ?Sized>(&self, values: &[f64], candidate: f64, rng: &mut R) -> f64 {
        let sample_size = values.len().min(self.config.max_samples);
        let mut total = 0.0;
        for _ in 0..self.config.trees {
            let sample = if sample_size == values.len() {
                values.to_vec()
            } else {
                index::sample(rng, values.len(), sample_size)
                    .into_iter()
                    .map(|i| values[i])
                    .collect()
            };
            total += isolation_depth(sample, candidate, rng);
        }
        total / self.config.trees as f64
    }

    /// Mean depth of the most easily isolated history value, each value
    /// scored against the rest of the window.
    fn shallowest_history_depth<R: Rng + ?Sized>(&self, baseline: &[f64], rng: &mut R) -> f64 {
        let mut rest = Vec::with_capacity(baseline.len());
        let mut shallowest = f64::INFINITY;
        for (i, &value) in baseline.iter().enumerate() {
            rest.clear();
            rest.extend_from_slice(&baseline[..i]);
            rest.extend_from_slice(&baseline[i + 1..]);
            shallowest = shallowest.min(self.mean_depth(&rest, value, rng));
        }
        shallowest
    }
}
