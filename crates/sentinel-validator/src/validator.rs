//! Integrity validator - one validated value per round from untrusted sources.
//!
//! # Round
//!
//! 1. **Fetching**: one task per source, each bounded by the per-source
//!    timeout, all bounded by the round deadline. Stragglers are aborted when
//!    the deadline fires and their late results never reach the round.
//! 2. **Scoring**: after the join barrier, each reading is scored against its
//!    own source's history. Inliers are appended to that history; outliers
//!    are recorded as dissent and never stored.
//! 3. **Aggregating**: inliers go to quorum consensus.
//!
//! Rounds take `&mut self`, so one validator never runs two rounds at once
//! and history is only touched by the scoring step.

use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use sentinel_consensus::{ConsensusAggregator, ConsensusVerdict};
use sentinel_history::{now_millis, HistoryStore, Reading, SourceId};
use sentinel_scoring::AnomalyScorer;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::ValidatorConfig;
use crate::error::{Error, Result, SourceError};
use crate::gateway::SourceBinding;
use crate::publish::Publisher;
use crate::round::{
    RejectionReason, RoundOutcome, RoundPhase, SourceOutcome, ValidationRound, ValidatorStats,
};

type Response = (SourceId, std::result::Result<Reading, SourceError>);

/// Orchestrates fetch, scoring and consensus for one monitored value.
pub struct IntegrityValidator {
    config: ValidatorConfig,
    sources: Vec<SourceBinding>,
    histories: HashMap<SourceId, HistoryStore>,
    scorer: AnomalyScorer,
    aggregator: ConsensusAggregator,
    publishers: Vec<Arc<dyn Publisher>>,
    stats: ValidatorStats,
    next_round: u64,
}

impl std::fmt::Debug for IntegrityValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityValidator")
            .field("config", &self.config)
            .field("sources", &self.sources)
            .field("publishers", &self.publishers.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl IntegrityValidator {
    /// Create a validator over `sources`.
    ///
    /// Fails if the configuration is out of range, no sources are given, a
    /// source id repeats, or the quorum exceeds the number of sources.
    pub fn new(config: ValidatorConfig, sources: Vec<SourceBinding>) -> Result<Self> {
        config.validate()?;

        if sources.is_empty() {
            return Err(Error::NoSources);
        }
        if config.quorum > sources.len() {
            return Err(Error::InvalidConfig(format!(
                "quorum {} exceeds {} configured sources",
                config.quorum,
                sources.len()
            )));
        }

        let mut histories = HashMap::with_capacity(sources.len());
        for binding in &sources {
            let store = HistoryStore::new(binding.id.clone(), config.window_size)?;
            if histories.insert(binding.id.clone(), store).is_some() {
                return Err(Error::DuplicateSource(binding.id.clone()));
            }
        }

        let scorer = AnomalyScorer::new(config.scorer_config())?;
        let aggregator = ConsensusAggregator::with_policy(config.quorum_policy()?);

        debug!(
            sources = sources.len(),
            quorum = config.quorum,
            tolerance = config.tolerance,
            window = config.window_size,
            deadline = ?config.round_deadline,
            "Created integrity validator"
        );

        Ok(Self {
            config,
            sources,
            histories,
            scorer,
            aggregator,
            publishers: Vec::new(),
            stats: ValidatorStats::default(),
            next_round: 1,
        })
    }

    /// Register a consumer for round outcomes.
    pub fn subscribe(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers.push(publisher);
    }

    /// The active configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Configured source ids, in binding order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceId> {
        self.sources.iter().map(|b| &b.id)
    }

    /// History window of `source`.
    pub fn history(&self, source: &SourceId) -> Option<&HistoryStore> {
        self.histories.get(source)
    }

    /// Cumulative round counters.
    pub fn stats(&self) -> &ValidatorStats {
        &self.stats
    }

    /// Sources whose history is long enough to be scored.
    pub fn warm_sources(&self) -> BTreeSet<SourceId> {
        self.histories
            .values()
            .filter(|h| h.len() >= self.config.warmup_min)
            .map(|h| h.source().clone())
            .collect()
    }

    /// Warm-start a source's history from previously accepted readings.
    ///
    /// Readings are trusted as given; they are not scored.
    pub fn seed_history<I>(&mut self, source: &SourceId, readings: I) -> Result<usize>
    where
        I: IntoIterator<Item = Reading>,
    {
        let store = self
            .histories
            .get_mut(source)
            .ok_or_else(|| Error::UnknownSource(source.clone()))?;
        let seeded = store.seed(readings)?;
        debug!(source = %source, seeded, held = store.len(), "Seeded history");
        Ok(seeded)
    }

    /// Run one round and deliver the outcome to every subscriber.
    pub async fn run_round(&mut self) -> RoundOutcome {
        let outcome = self.validate_round().await;
        for publisher in &self.publishers {
            publisher.publish(&outcome);
        }
        outcome
    }

    /// Run one round without publishing.
    pub async fn validate_round(&mut self) -> RoundOutcome {
        let mut round = ValidationRound::new(self.next_round, now_millis());
        self.next_round += 1;

        round.advance(RoundPhase::Fetching);
        let responses = self.fetch_all(round.number()).await;

        let outcome = self.conclude(round, responses);
        self.stats.record_outcome(&outcome);

        match &outcome {
            RoundOutcome::Validated(v) => debug!(
                round = v.round,
                value = v.value,
                confidence = v.confidence,
                "Round concluded"
            ),
            RoundOutcome::Rejected(r) => {
                debug!(round = r.round, reason = %r.reason, "Round concluded without a value")
            }
        }
        outcome
    }

    /// Fetch phase: fan out, then join until done or the deadline fires.
    ///
    /// Every configured source appears exactly once in the result.
    async fn fetch_all(&self, round: u64) -> Vec<Response> {
        let deadline = Instant::now() + self.config.round_deadline;
        let per_source = self.config.effective_source_timeout();

        let mut tasks = JoinSet::new();
        let mut pending = HashMap::with_capacity(self.sources.len());
        for binding in &self.sources {
            let source = binding.id.clone();
            let gateway = Arc::clone(&binding.gateway);
            let handle = tasks.spawn(async move {
                // `fetch` runs inside the guard so a panic while building the
                // future is caught along with one raised while polling it.
                let fetch = AssertUnwindSafe(async { gateway.fetch(&source, deadline).await })
                    .catch_unwind();
                match timeout(per_source, fetch).await {
                    Ok(Ok(Ok(reading))) if reading.source() != &source => {
                        Err(SourceError::WrongSource {
                            expected: source.clone(),
                            actual: reading.source().clone(),
                        })
                    }
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(SourceError::TaskFailed("gateway panicked".into())),
                    Err(_) => Err(SourceError::TimedOut(per_source)),
                }
            });
            pending.insert(handle.id(), binding.id.clone());
        }

        let mut responses: HashMap<SourceId, std::result::Result<Reading, SourceError>> =
            HashMap::with_capacity(self.sources.len());
        loop {
            match timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(Ok((task, result)))) => {
                    if let Some(id) = pending.remove(&task) {
                        responses.insert(id, result);
                    }
                }
                Ok(Some(Err(e))) => {
                    if let Some(id) = pending.remove(&e.id()) {
                        warn!(round, source = %id, error = %e, "Fetch task did not complete");
                        responses.insert(id, Err(SourceError::TaskFailed(e.to_string())));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        round,
                        pending = tasks.len(),
                        "Round deadline elapsed, cancelling outstanding fetches"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        self.sources
            .iter()
            .map(|b| {
                let result = responses
                    .remove(&b.id)
                    .unwrap_or(Err(SourceError::DeadlineElapsed));
                (b.id.clone(), result)
            })
            .collect()
    }

    /// Scoring and aggregation, after the join barrier.
    fn conclude(&mut self, mut round: ValidationRound, responses: Vec<Response>) -> RoundOutcome {
        round.advance(RoundPhase::Scoring);
        let inliers = self.screen(&mut round, responses);

        round.advance(RoundPhase::Aggregating);
        let responded = round.responded();
        let required = self.config.quorum;
        if responded < required {
            return round.reject(RejectionReason::InsufficientQuorum {
                received: responded,
                required,
            });
        }
        if inliers.is_empty() {
            let anomalous = round.anomalous_sources().len();
            return round.reject(RejectionReason::NoInliers {
                responded,
                anomalous,
            });
        }

        match self.aggregator.aggregate(&inliers) {
            ConsensusVerdict::Agreed(agreement) => round.validate(
                agreement.agreed_value,
                agreement.supporting,
                agreement.dissenting,
                self.sources.len(),
            ),
            ConsensusVerdict::InsufficientQuorum { received, required } => {
                round.reject(RejectionReason::InsufficientQuorum { received, required })
            }
            ConsensusVerdict::InconsistentData { clusters, required } => {
                round.reject(RejectionReason::InconsistentData { clusters, required })
            }
        }
    }

    /// Score each response against its source's history.
    ///
    /// Inliers are appended to history and returned; everything else is
    /// recorded in the round only.
    fn screen(&mut self, round: &mut ValidationRound, responses: Vec<Response>) -> Vec<Reading> {
        let mut inliers = Vec::with_capacity(responses.len());

        for (id, response) in responses {
            let reading = match response {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(round = round.number(), source = %id, error = %e, "Source unavailable");
                    self.stats.sources_unavailable += 1;
                    round.record(id, SourceOutcome::Unavailable(e));
                    continue;
                }
            };

            let Some(history) = self.histories.get_mut(&id) else {
                // Responses are built from the bindings, which all have a history.
                continue;
            };

            let verdict = self.scorer.score(&*history, &reading);
            if verdict.is_inlier {
                if let Err(e) = history.push(reading.clone()) {
                    warn!(
                        round = round.number(),
                        source = %id,
                        error = %e,
                        "Could not record reading"
                    );
                    self.stats.sources_unavailable += 1;
                    round.record(id, SourceOutcome::Unavailable(e.into()));
                    continue;
                }
                debug!(
                    round = round.number(),
                    source = %id,
                    value = reading.value(),
                    score = verdict.score,
                    "Reading accepted"
                );
                inliers.push(reading);
                round.record(id, SourceOutcome::Accepted(verdict));
            } else {
                warn!(
                    round = round.number(),
                    source = %id,
                    value = reading.value(),
                    score = verdict.score,
                    "Anomaly detected, reading excluded"
                );
                self.stats.anomalies_detected += 1;
                round.record(id, SourceOutcome::Anomalous(verdict));
            }
        }

        inliers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SourceGateway;
    use crate::publish::ChannelPublisher;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns a fixed value after a fixed delay.
    struct FixedGateway {
        value: f64,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedGateway {
        fn new(value: f64) -> Arc<Self> {
            Self::delayed(value, Duration::ZERO)
        }

        fn delayed(value: f64, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                value,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl SourceGateway for FixedGateway {
        fn fetch<'a>(
            &'a self,
            source: &'a SourceId,
            _deadline: Instant,
        ) -> BoxFuture<'a, std::result::Result<Reading, SourceError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                Reading::now(source.clone(), self.value).map_err(SourceError::from)
            })
        }
    }

    struct FailingGateway;

    impl SourceGateway for FailingGateway {
        fn fetch<'a>(
            &'a self,
            _source: &'a SourceId,
            _deadline: Instant,
        ) -> BoxFuture<'a, std::result::Result<Reading, SourceError>> {
            Box::pin(async { Err(SourceError::Unavailable("connection refused".into())) })
        }
    }

    struct PanickingGateway;

    impl SourceGateway for PanickingGateway {
        fn fetch<'a>(
            &'a self,
            source: &'a SourceId,
            _deadline: Instant,
        ) -> BoxFuture<'a, std::result::Result<Reading, SourceError>> {
            Box::pin(async move {
                if source.as_str() == "buggy" {
                    panic!("gateway bug");
                }
                Err(SourceError::Unavailable("not buggy".into()))
            })
        }
    }

    /// Panics in `fetch` itself, before any future exists.
    struct EagerPanicGateway;

    impl SourceGateway for EagerPanicGateway {
        fn fetch<'a>(
            &'a self,
            source: &'a SourceId,
            _deadline: Instant,
        ) -> BoxFuture<'a, std::result::Result<Reading, SourceError>> {
            if source.as_str() == "eager" {
                panic!("gateway failed before fetching");
            }
            Box::pin(async { Err(SourceError::Unavailable("not eager".into())) })
        }
    }

    /// Claims to be another source.
    struct ImpostorGateway;

    impl SourceGateway for ImpostorGateway {
        fn fetch<'a>(
            &'a self,
            _source: &'a SourceId,
            _deadline: Instant,
        ) -> BoxFuture<'a, std::result::Result<Reading, SourceError>> {
            Box::pin(async {
                Reading::now(SourceId::new("someone-else"), 10.0).map_err(SourceError::from)
            })
        }
    }

    fn bindings(values: &[f64]) -> Vec<SourceBinding> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let gateway = FixedGateway::new(*v) as Arc<dyn SourceGateway>;
                SourceBinding::new(format!("s{}", i), gateway)
            })
            .collect()
    }

    fn config() -> ValidatorConfig {
        ValidatorConfig::default()
            .with_quorum(3)
            .with_tolerance(0.01)
            .with_round_deadline(Duration::from_secs(1))
            .with_per_source_timeout(Duration::from_millis(500))
    }

    fn tight_history(source: &SourceId) -> Vec<Reading> {
        (0..50)
            .map(|i| Reading::new(source.clone(), 99.0 + 2.0 * i as f64 / 49.0, i).unwrap())
            .collect()
    }

    #[test]
    fn construction_checks() {
        assert_eq!(
            IntegrityValidator::new(config(), Vec::new()).unwrap_err(),
            Error::NoSources
        );

        let err = IntegrityValidator::new(config(), bindings(&[1.0, 1.0])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let mut dup = bindings(&[1.0, 1.0, 1.0]);
        dup[2].id = SourceId::new("s0");
        assert_eq!(
            IntegrityValidator::new(config(), dup).unwrap_err(),
            Error::DuplicateSource(SourceId::new("s0"))
        );
    }

    #[test]
    fn seed_unknown_source_fails() {
        let mut validator = IntegrityValidator::new(config(), bindings(&[1.0, 1.0, 1.0])).unwrap();
        let ghost = SourceId::new("ghost");
        assert_eq!(
            validator.seed_history(&ghost, Vec::new()).unwrap_err(),
            Error::UnknownSource(ghost)
        );
    }

    #[tokio::test]
    async fn agreeing_sources_validate() {
        let mut validator =
            IntegrityValidator::new(config(), bindings(&[10.0, 10.0, 10.0, 10.0, 50.0])).unwrap();

        let outcome = validator.validate_round().await;
        let v = outcome.validated().expect("round should validate");

        assert_eq!(v.value, 10.0);
        assert_eq!(v.supporting.len(), 4);
        assert_eq!(v.confidence, 0.8);
        assert!(v.dissenting.contains(&SourceId::new("s4")));
        assert_eq!(validator.stats().validated, 1);
    }

    #[tokio::test]
    async fn inliers_are_recorded_in_history() {
        let mut validator = IntegrityValidator::new(config(), bindings(&[5.0, 5.0, 5.0])).unwrap();
        validator.validate_round().await;
        validator.validate_round().await;

        for id in ["s0", "s1", "s2"] {
            assert_eq!(validator.history(&SourceId::new(id)).unwrap().values(), vec![5.0, 5.0]);
        }
    }

    #[tokio::test]
    async fn outlier_never_reaches_history() {
        let mut sources = bindings(&[100.0, 100.0, 100.0]);
        sources.push(SourceBinding::new(
            "tampered",
            FixedGateway::new(500.0) as Arc<dyn SourceGateway>,
        ));
        let mut validator = IntegrityValidator::new(config(), sources).unwrap();

        let tampered = SourceId::new("tampered");
        validator.seed_history(&tampered, tight_history(&tampered)).unwrap();

        let outcome = validator.validate_round().await;
        let v = outcome.validated().expect("honest sources still agree");

        assert!(v.dissenting.contains(&tampered));
        let history = validator.history(&tampered).unwrap();
        assert_eq!(history.len(), 50);
        assert!(history.iter().all(|r| r.value() < 200.0));
        assert_eq!(validator.stats().anomalies_detected, 1);
    }

    #[tokio::test]
    async fn failed_sources_are_non_responses() {
        let mut sources = bindings(&[7.0, 7.0]);
        sources.push(SourceBinding::new(
            "down",
            Arc::new(FailingGateway) as Arc<dyn SourceGateway>,
        ));
        let mut validator = IntegrityValidator::new(config(), sources).unwrap();

        let outcome = validator.validate_round().await;
        let r = outcome.rejection().expect("two of three cannot reach quorum 3");

        assert_eq!(
            r.reason,
            RejectionReason::InsufficientQuorum {
                received: 2,
                required: 3
            }
        );
        assert!(matches!(
            r.outcomes[&SourceId::new("down")],
            SourceOutcome::Unavailable(SourceError::Unavailable(_))
        ));
        assert_eq!(validator.stats().sources_unavailable, 1);
    }

    #[tokio::test]
    async fn panicking_gateway_is_contained() {
        let mut sources = bindings(&[7.0, 7.0, 7.0]);
        sources.push(SourceBinding::new(
            "buggy",
            Arc::new(PanickingGateway) as Arc<dyn SourceGateway>,
        ));
        let mut validator = IntegrityValidator::new(config(), sources).unwrap();

        let outcome = validator.validate_round().await;
        let v = outcome.validated().unwrap();
        assert!(v.unavailable.contains(&SourceId::new("buggy")));
    }

    #[tokio::test]
    async fn panic_before_the_future_exists_is_task_failure() {
        let mut sources = bindings(&[7.0, 7.0]);
        sources.push(SourceBinding::new(
            "eager",
            Arc::new(EagerPanicGateway) as Arc<dyn SourceGateway>,
        ));
        let mut validator = IntegrityValidator::new(config(), sources).unwrap();

        let outcome = validator.validate_round().await;
        let r = outcome.rejection().expect("two of three cannot reach quorum 3");

        assert_eq!(
            r.reason,
            RejectionReason::InsufficientQuorum {
                received: 2,
                required: 3
            }
        );
        assert!(matches!(
            r.outcomes[&SourceId::new("eager")],
            SourceOutcome::Unavailable(SourceError::TaskFailed(_))
        ));
        assert_eq!(validator.stats().sources_unavailable, 1);
    }

    #[tokio::test]
    async fn misattributed_reading_is_refused() {
        let mut sources = bindings(&[7.0, 7.0, 7.0]);
        sources.push(SourceBinding::new(
            "impostor",
            Arc::new(ImpostorGateway) as Arc<dyn SourceGateway>,
        ));
        let mut validator = IntegrityValidator::new(config(), sources).unwrap();

        let outcome = validator.validate_round().await;
        let v = outcome.validated().unwrap();
        assert!(v.unavailable.contains(&SourceId::new("impostor")));
        assert!(validator.history(&SourceId::new("impostor")).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out() {
        let mut sources = bindings(&[3.0, 3.0, 3.0]);
        sources.push(SourceBinding::new(
            "slow",
            FixedGateway::delayed(3.0, Duration::from_secs(60)) as Arc<dyn SourceGateway>,
        ));
        let mut validator = IntegrityValidator::new(config(), sources).unwrap();

        let outcome = validator.validate_round().await;
        let v = outcome.validated().unwrap();

        assert_eq!(v.supporting.len(), 3);
        assert!(v.unavailable.contains(&SourceId::new("slow")));
        assert!(validator.history(&SourceId::new("slow")).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn round_deadline_cuts_off_stragglers() {
        // Per-source timeout longer than the deadline is clamped to it.
        let config = config()
            .with_round_deadline(Duration::from_millis(200))
            .with_per_source_timeout(Duration::from_secs(5));
        let slow = |v| FixedGateway::delayed(v, Duration::from_secs(1)) as Arc<dyn SourceGateway>;
        let sources = vec![
            SourceBinding::new("fast-1", FixedGateway::new(1.0) as Arc<dyn SourceGateway>),
            SourceBinding::new("fast-2", FixedGateway::new(1.0) as Arc<dyn SourceGateway>),
            SourceBinding::new("slow-1", slow(1.0)),
            SourceBinding::new("slow-2", slow(1.0)),
        ];
        let mut validator = IntegrityValidator::new(config, sources).unwrap();

        let started = Instant::now();
        let outcome = validator.validate_round().await;

        assert!(started.elapsed() <= Duration::from_millis(250));
        let r = outcome.rejection().unwrap();
        assert_eq!(
            r.reason,
            RejectionReason::InsufficientQuorum {
                received: 2,
                required: 3
            }
        );
        assert!(validator.history(&SourceId::new("slow-1")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_anomalous_is_no_inliers() {
        let sources = bindings(&[500.0, 500.0, 500.0]);
        let ids: Vec<SourceId> = sources.iter().map(|b| b.id.clone()).collect();
        let mut validator = IntegrityValidator::new(config(), sources).unwrap();
        for id in &ids {
            validator.seed_history(id, tight_history(id)).unwrap();
        }

        let outcome = validator.validate_round().await;
        let r = outcome.rejection().unwrap();
        assert_eq!(
            r.reason,
            RejectionReason::NoInliers {
                responded: 3,
                anomalous: 3
            }
        );
        assert_eq!(validator.warm_sources().len(), 3);
    }

    #[tokio::test]
    async fn run_round_publishes_to_subscribers() {
        let mut validator = IntegrityValidator::new(config(), bindings(&[2.0, 2.0, 2.0])).unwrap();
        let channel = ChannelPublisher::new(4);
        let mut rx = channel.subscribe();
        validator.subscribe(Arc::new(channel));

        let outcome = validator.run_round().await;
        assert_eq!(rx.recv().await.unwrap(), outcome);
        assert_eq!(outcome.round(), 1);

        let second = validator.run_round().await;
        assert_eq!(second.round(), 2);
    }
}
