//! The Sentinel node: a validator driven by a round timer.

use std::sync::Arc;

use sentinel_validator::{
    now_millis, IntegrityValidator, LogPublisher, Publisher, SourceId, ValidatorStats,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::feed::{history_readings, Feed};

/// A running node instance.
pub struct SentinelNode {
    config: NodeConfig,
    validator: IntegrityValidator,
}

impl SentinelNode {
    /// Build a node from a config and an already-loaded feed.
    pub fn new(config: NodeConfig, feed: &Feed) -> Result<Self> {
        let bindings = feed.bindings(config.validator.seed);
        let mut validator = IntegrityValidator::new(config.validator.clone(), bindings)?;

        let now = now_millis();
        for source in &feed.sources {
            let readings = history_readings(source, now, config.interval)?;
            let seeded = validator.seed_history(&SourceId::new(source.id.as_str()), readings)?;
            debug!(source = %source.id, seeded, "Warmed history from feed");
        }

        validator.subscribe(Arc::new(LogPublisher));

        Ok(Self { config, validator })
    }

    /// Load the configured feed and build a node.
    pub fn from_config(config: NodeConfig) -> Result<Self> {
        let feed = Feed::load(&config.feed)?;
        info!(feed = %config.feed.display(), sources = feed.sources.len(), "Loaded feed");
        Self::new(config, &feed)
    }

    /// Add another outcome consumer.
    pub fn subscribe(&mut self, publisher: Arc<dyn Publisher>) {
        self.validator.subscribe(publisher);
    }

    /// Counters so far.
    pub fn stats(&self) -> &ValidatorStats {
        self.validator.stats()
    }

    /// Run rounds until the round limit or Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            sources = self.validator.sources().count(),
            quorum = self.config.validator.quorum,
            interval = ?self.config.interval,
            "Sentinel node running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.validator.run_round().await;
                    if self.config.rounds.is_some_and(|max| self.validator.stats().rounds >= max) {
                        info!(rounds = self.validator.stats().rounds, "Round limit reached");
                        break;
                    }
                }
                result = &mut shutdown => {
                    result?;
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        info!(
            rate = self.validator.stats().validation_rate(),
            "{}",
            self.validator.stats()
        );
        Ok(())
    }
}
