//! Reading and source identifier types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, Result};

/// Identifier of one independent data source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a source identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single observation reported by a source.
///
/// Readings are immutable once created. The value is always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    source: SourceId,
    value: f64,
    /// Unix milliseconds at which the source observed the value.
    observed_at: u64,
}

impl Reading {
    /// Create a reading, rejecting NaN and infinite values.
    pub fn new(source: SourceId, value: f64, observed_at: u64) -> Result<Self> {
        if !value.is_finite() {
            return Err(HistoryError::NonFiniteValue {
                source_id: source,
                value,
            });
        }
        Ok(Self {
            source,
            value,
            observed_at,
        })
    }

    /// Create a reading stamped with the current wall-clock time.
    pub fn now(source: SourceId, value: f64) -> Result<Self> {
        Self::new(source, value, now_millis())
    }

    /// The reporting source.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// The observed value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Observation time in unix milliseconds.
    pub fn observed_at(&self) -> u64 {
        self.observed_at
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
