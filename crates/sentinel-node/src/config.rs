//! Node configuration from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sentinel_validator::ValidatorConfig;

use crate::error::{Error, Result};

/// Configuration for a Sentinel node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// JSON feed describing the replayed sources.
    pub feed: PathBuf,

    /// Time between round starts.
    pub interval: Duration,

    /// Stop after this many rounds. `None` runs until Ctrl-C.
    pub rounds: Option<u64>,

    /// Validator settings.
    pub validator: ValidatorConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            feed: PathBuf::from("./feed.json"),
            interval: Duration::from_secs(1),
            rounds: None,
            validator: ValidatorConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let v = defaults.validator.clone();

        let feed = lookup("SENTINEL_FEED").map(PathBuf::from).unwrap_or(defaults.feed);
        let interval = parse_or(
            &lookup,
            "SENTINEL_INTERVAL_MS",
            defaults.interval.as_millis() as u64,
        )?;
        let rounds = parse_opt(&lookup, "SENTINEL_ROUNDS")?;

        let deadline = parse_or(
            &lookup,
            "SENTINEL_ROUND_DEADLINE_MS",
            v.round_deadline.as_millis() as u64,
        )?;
        let source_timeout = parse_or(
            &lookup,
            "SENTINEL_SOURCE_TIMEOUT_MS",
            v.per_source_timeout.as_millis() as u64,
        )?;

        let validator = ValidatorConfig::default()
            .with_quorum(parse_or(&lookup, "SENTINEL_QUORUM", v.quorum)?)
            .with_tolerance(parse_or(&lookup, "SENTINEL_TOLERANCE", v.tolerance)?)
            .with_window_size(parse_or(&lookup, "SENTINEL_WINDOW", v.window_size)?)
            .with_warmup_min(parse_or(&lookup, "SENTINEL_WARMUP", v.warmup_min)?)
            .with_contamination_threshold(parse_or(
                &lookup,
                "SENTINEL_CONTAMINATION",
                v.contamination_threshold,
            )?)
            .with_round_deadline(Duration::from_millis(deadline))
            .with_per_source_timeout(Duration::from_millis(source_timeout))
            .with_seed(parse_or(&lookup, "SENTINEL_SEED", v.seed)?);

        if interval == 0 {
            return Err(Error::Config("SENTINEL_INTERVAL_MS must be non-zero".into()));
        }

        Ok(Self {
            feed,
            interval: Duration::from_millis(interval),
            rounds,
            validator,
        })
    }
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {}={:?}: {}", key, raw, e))),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}
