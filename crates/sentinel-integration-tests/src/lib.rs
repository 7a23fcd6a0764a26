//! Shared harness for end-to-end validator tests.
//!
//! Import from a test file with:
//! ```ignore
//! use sentinel_integration_tests::*;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use futures::future::BoxFuture;
use sentinel_history::{Reading, SourceId};
use sentinel_validator::{
    IntegrityValidator, Publisher, Rejection, RoundOutcome, SourceBinding, SourceError,
    SourceGateway, ValidatedReading, ValidatorConfig,
};
use tokio::time::Instant;

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Honours `RUST_LOG`, quiet by default.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// One scripted response.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Answer with this value immediately.
    Value(f64),
    /// Answer with this value after the delay.
    Delayed(f64, Duration),
    /// Report a gateway failure.
    Fail(String),
    /// Never answer.
    Hang,
}

/// Gateway that replays a script, repeating the last step once exhausted.
#[derive(Debug)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedGateway {
    /// A gateway following `steps`.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(None),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }

    /// Always answers `value`.
    pub fn constant(value: f64) -> Arc<Self> {
        Self::new([Step::Value(value)])
    }

    /// Answers each value once, in order.
    pub fn series(values: &[f64]) -> Arc<Self> {
        Self::new(values.iter().map(|v| Step::Value(*v)))
    }

    /// Always answers `value` after `delay`.
    pub fn delayed(value: f64, delay: Duration) -> Arc<Self> {
        Self::new([Step::Delayed(value, delay)])
    }

    /// Never answers.
    pub fn hanging() -> Arc<Self> {
        Self::new([Step::Hang])
    }

    /// Always fails.
    pub fn failing(reason: &str) -> Arc<Self> {
        Self::new([Step::Fail(reason.to_string())])
    }

    /// Fetches begun.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Fetches that ran to completion, successful or not.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match script.pop_front() {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Hang),
        }
    }
}

impl SourceGateway for ScriptedGateway {
    fn fetch<'a>(
        &'a self,
        source: &'a SourceId,
        _deadline: Instant,
    ) -> BoxFuture<'a, Result<Reading, SourceError>> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            let result = match self.next_step() {
                Step::Value(v) => Reading::now(source.clone(), v).map_err(SourceError::from),
                Step::Delayed(v, delay) => {
                    tokio::time::sleep(delay).await;
                    Reading::now(source.clone(), v).map_err(SourceError::from)
                }
                Step::Fail(reason) => Err(SourceError::Unavailable(reason)),
                Step::Hang => futures::future::pending::<Result<Reading, SourceError>>().await,
            };
            self.finished.fetch_add(1, Ordering::SeqCst);
            result
        })
    }
}

/// Publisher that keeps every outcome it sees.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    outcomes: Mutex<Vec<RoundOutcome>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every outcome so far, in order.
    pub fn outcomes(&self) -> Vec<RoundOutcome> {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn validated(&self) -> Vec<ValidatedReading> {
        self.outcomes()
            .iter()
            .filter_map(|o| o.validated().cloned())
            .collect()
    }

    pub fn rejected(&self) -> Vec<Rejection> {
        self.outcomes()
            .iter()
            .filter_map(|o| o.rejection().cloned())
            .collect()
    }

    fn push(&self, outcome: RoundOutcome) {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner()).push(outcome);
    }
}

impl Publisher for RecordingPublisher {
    fn on_validated(&self, reading: &ValidatedReading) {
        self.push(RoundOutcome::Validated(reading.clone()));
    }

    fn on_rejected(&self, rejection: &Rejection) {
        self.push(RoundOutcome::Rejected(rejection.clone()));
    }
}

/// Source id for the `i`th harness source.
pub fn source(i: usize) -> SourceId {
    SourceId::new(format!("source-{}", i))
}

/// Config used across scenarios: quorum 3, tolerance 0.01, short deadlines.
pub fn scenario_config() -> ValidatorConfig {
    ValidatorConfig::default()
        .with_quorum(3)
        .with_tolerance(0.01)
        .with_round_deadline(Duration::from_secs(2))
        .with_per_source_timeout(Duration::from_secs(1))
}

/// Bind `gateways` to `source(0)..source(n)`.
pub fn bind(gateways: &[Arc<ScriptedGateway>]) -> Vec<SourceBinding> {
    gateways
        .iter()
        .enumerate()
        .map(|(i, g)| SourceBinding::new(source(i), Arc::clone(g) as Arc<dyn SourceGateway>))
        .collect()
}

/// A validator over constant sources, with a recording publisher attached.
pub fn constant_validator(
    config: ValidatorConfig,
    values: &[f64],
) -> (IntegrityValidator, Arc<RecordingPublisher>) {
    let gateways: Vec<_> = values.iter().map(|v| ScriptedGateway::constant(*v)).collect();
    validator_over(config, &gateways)
}

/// A validator over `gateways`, with a recording publisher attached.
pub fn validator_over(
    config: ValidatorConfig,
    gateways: &[Arc<ScriptedGateway>],
) -> (IntegrityValidator, Arc<RecordingPublisher>) {
    init_test_logging();
    let mut validator =
        IntegrityValidator::new(config, bind(gateways)).expect("harness config is valid");
    let recorder = RecordingPublisher::new();
    validator.subscribe(Arc::clone(&recorder) as Arc<dyn Publisher>);
    (validator, recorder)
}

/// `n` readings for `source` spread evenly over `[centre - spread, centre + spread]`.
pub fn tight_history(source: &SourceId, n: usize, centre: f64, spread: f64) -> Vec<Reading> {
    (0..n)
        .map(|i| {
            let t = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.5 };
            let value = centre - spread + 2.0 * spread * t;
            Reading::new(source.clone(), value, i as u64).expect("finite value")
        })
        .collect()
}
