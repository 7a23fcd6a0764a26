//! Replayed source feeds.
//!
//! A feed file lists sources and the values each one reports, in order:
//!
//! ```json
//! {
//!   "sources": [
//!     { "id": "alpha", "values": [100.0, 100.2], "latency_ms": 20,
//!       "failure_ratio": 0.05, "history": [99.8, 100.1] }
//!   ]
//! }
//! ```
//!
//! Each source becomes a [`ReplayGateway`] that cycles through its values.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sentinel_validator::{Reading, SourceBinding, SourceError, SourceGateway, SourceId};
use tokio::time::Instant;

use crate::error::{Error, Result};

/// One replayed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFeed {
    /// Source id.
    pub id: String,
    /// Values reported round after round, wrapping at the end.
    pub values: Vec<f64>,
    /// Simulated response latency.
    #[serde(default)]
    pub latency_ms: u64,
    /// Fraction of fetches that fail, in `[0, 1]`.
    #[serde(default)]
    pub failure_ratio: f64,
    /// Previously accepted values used to warm the history window.
    #[serde(default)]
    pub history: Vec<f64>,
}

/// A feed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub sources: Vec<SourceFeed>,
}

impl Feed {
    /// Load and check a feed file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and check a feed document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let feed: Feed = serde_json::from_str(raw)?;
        feed.check()?;
        Ok(feed)
    }

    fn check(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::Feed("feed lists no sources".into()));
        }
        for source in &self.sources {
            if source.values.is_empty() {
                return Err(Error::Feed(format!("source {} has no values", source.id)));
            }
            if !(0.0..=1.0).contains(&source.failure_ratio) {
                return Err(Error::Feed(format!(
                    "source {} failure_ratio {} outside [0, 1]",
                    source.id, source.failure_ratio
                )));
            }
        }
        Ok(())
    }

    /// Build a gateway binding per source.
    ///
    /// Each gateway gets its own failure-injection stream derived from `seed`.
    pub fn bindings(&self, seed: u64) -> Vec<SourceBinding> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                let gateway = ReplayGateway::new(
                    source.values.clone(),
                    Duration::from_millis(source.latency_ms),
                    source.failure_ratio,
                    seed.wrapping_add(i as u64),
                );
                SourceBinding::new(source.id.as_str(), Arc::new(gateway) as Arc<dyn SourceGateway>)
            })
            .collect()
    }
}

/// Serves a fixed series of values with simulated latency and failures.
#[derive(Debug)]
pub struct ReplayGateway {
    values: Vec<f64>,
    cursor: AtomicUsize,
    latency: Duration,
    failure_ratio: f64,
    rng: Mutex<StdRng>,
}

impl ReplayGateway {
    /// Create a gateway over `values`.
    pub fn new(values: Vec<f64>, latency: Duration, failure_ratio: f64, seed: u64) -> Self {
        Self {
            values,
            cursor: AtomicUsize::new(0),
            latency,
            failure_ratio,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Number of fetches served so far, failed ones included.
    pub fn served(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    fn should_fail(&self) -> std::result::Result<bool, SourceError> {
        if self.failure_ratio <= 0.0 {
            return Ok(false);
        }
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| SourceError::TaskFailed("replay rng poisoned".into()))?;
        Ok(rng.gen_bool(self.failure_ratio))
    }
}

impl SourceGateway for ReplayGateway {
    fn fetch<'a>(
        &'a self,
        source: &'a SourceId,
        _deadline: Instant,
    ) -> BoxFuture<'a, std::result::Result<Reading, SourceError>> {
        Box::pin(async move {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            if self.values.is_empty() {
                return Err(SourceError::Unavailable("feed exhausted".into()));
            }
            let fail = self.should_fail()?;

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if fail {
                return Err(SourceError::Unavailable("injected failure".into()));
            }

            let value = self.values[index % self.values.len()];
            Reading::now(source.clone(), value).map_err(SourceError::from)
        })
    }
}

/// Turn a source's warm-up values into readings ending at `end`, one `step` apart.
pub fn history_readings(source: &SourceFeed, end: u64, step: Duration) -> Result<Vec<Reading>> {
    let step = step.as_millis() as u64;
    let n = source.history.len() as u64;
    source
        .history
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let at = end.saturating_sub((n - i as u64) * step);
            Reading::new(SourceId::new(source.id.as_str()), *value, at)
                .map_err(|e| Error::Feed(format!("source {} history: {}", source.id, e)))
        })
        .collect()
}
