//! Tolerance banding of readings into clusters.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;
use sentinel_history::{Reading, SourceId};

/// A group of readings whose values all lie within one tolerance band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    members: Vec<Reading>,
    mean: f64,
    mean_abs_deviation: f64,
    first_observed: u64,
}

impl Cluster {
    /// Build a cluster from its members, sorted by value. `members` must not
    /// be empty.
    fn from_members(members: Vec<Reading>) -> Self {
        debug_assert!(!members.is_empty());
        // Offsets from the lowest member are bounded by the band width, so
        // the mean stays finite even next to f64::MAX.
        let base = members.first().map(Reading::value).unwrap_or(0.0);
        let mean = base + running_mean(members.iter().map(|r| r.value() - base));
        let mean_abs_deviation = running_mean(members.iter().map(|r| (r.value() - mean).abs()));
        let first_observed = members.iter().map(Reading::observed_at).min().unwrap_or(0);
        Self {
            members,
            mean,
            mean_abs_deviation,
            first_observed,
        }
    }

    /// Readings in the cluster, ordered by value.
    pub fn members(&self) -> &[Reading] {
        &self.members
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if empty (never true for clusters produced by [`band`]).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Arithmetic mean of the member values.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Mean absolute deviation from the cluster mean.
    pub fn mean_abs_deviation(&self) -> f64 {
        self.mean_abs_deviation
    }

    /// Earliest observation time among the members.
    pub fn first_observed(&self) -> u64 {
        self.first_observed
    }

    /// Distinct sources backing the cluster.
    pub fn sources(&self) -> BTreeSet<SourceId> {
        self.members.iter().map(|r| r.source().clone()).collect()
    }

    /// Distance between the smallest and largest member.
    pub fn spread(&self) -> f64 {
        match (self.members.first(), self.members.last()) {
            (Some(lo), Some(hi)) => hi.value() - lo.value(),
            _ => 0.0,
        }
    }

    /// Order clusters strongest first.
    ///
    /// More members, then tighter, then earlier, then lower.
    pub fn strength_cmp(&self, other: &Self) -> Ordering {
        other
            .len()
            .cmp(&self.len())
            .then_with(|| self.mean_abs_deviation.total_cmp(&other.mean_abs_deviation))
            .then_with(|| self.first_observed.cmp(&other.first_observed))
            .then_with(|| self.mean.total_cmp(&other.mean))
    }
}

/// Incremental mean, free of the overflow a plain sum hits for large values.
fn running_mean(values: impl Iterator<Item = f64>) -> f64 {
    values
        .enumerate()
        .fold(0.0, |mean, (k, x)| mean + (x - mean) / (k + 1) as f64)
}

/// Partition readings into tolerance bands.
///
/// Repeatedly takes the strongest window `[v, v + tolerance]` over the
/// readings not yet assigned. Clusters are returned strongest first.
pub fn band(readings: &[Reading], tolerance: f64) -> Vec<Cluster> {
    let mut remaining: Vec<Reading> = readings.to_vec();
    remaining.sort_by(|a, b| {
        a.value()
            .total_cmp(&b.value())
            .then_with(|| a.observed_at().cmp(&b.observed_at()))
            .then_with(|| a.source().cmp(b.source()))
    });

    let mut clusters = Vec::new();
    while !remaining.is_empty() {
        let mut best: Option<(usize, usize, Cluster)> = None;

        for start in 0..remaining.len() {
            let base = remaining[start].value();
            let end = start
                + remaining[start..]
                    .iter()
                    .take_while(|r| r.value() - base <= tolerance)
                    .count();
            let window = Cluster::from_members(remaining[start..end].to_vec());

            let stronger = match &best {
                Some((_, _, current)) => window.strength_cmp(current) == Ordering::Less,
                None => true,
            };
            if stronger {
                best = Some((start, end, window));
            }
        }

        match best {
            Some((start, end, cluster)) => {
                remaining.drain(start..end);
                clusters.push(cluster);
            }
            None => break,
        }
    }

    clusters
}
