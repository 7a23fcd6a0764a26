//! Bounded FIFO window of accepted readings for one source.

use std::collections::VecDeque;

use crate::error::{HistoryError, Result};
use crate::reading::{Reading, SourceId};

/// Per-source history window.
///
/// Holds at most `capacity` readings in arrival order. Pushing into a full
/// window evicts the oldest reading.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    source: SourceId,
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl HistoryStore {
    /// Create an empty window for `source`.
    pub fn new(source: SourceId, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HistoryError::ZeroCapacity);
        }
        Ok(Self {
            source,
            capacity,
            readings: VecDeque::with_capacity(capacity),
        })
    }

    /// The source this window belongs to.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Maximum number of readings retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of readings currently held.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Append a reading, returning the evicted one if the window was full.
    ///
    /// Readings from any other source are refused.
    pub fn push(&mut self, reading: Reading) -> Result<Option<Reading>> {
        if reading.source() != &self.source {
            return Err(HistoryError::SourceMismatch {
                expected: self.source.clone(),
                actual: reading.source().clone(),
            });
        }

        let evicted = if self.readings.len() == self.capacity {
            self.readings.pop_front()
        } else {
            None
        };
        self.readings.push_back(reading);
        Ok(evicted)
    }

    /// Warm-start the window from previously recorded readings.
    ///
    /// Readings are pushed in order, so only the newest `capacity` survive.
    /// Returns the number of readings pushed.
    pub fn seed<I>(&mut self, readings: I) -> Result<usize>
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut pushed = 0;
        for reading in readings {
            self.push(reading)?;
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Iterate readings oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Snapshot of the values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.readings.iter().map(Reading::value).collect()
    }

    /// The most recently accepted reading.
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Check whether an identical reading is held.
    pub fn contains(&self, reading: &Reading) -> bool {
        self.readings.iter().any(|r| r == reading)
    }

    /// Drop all readings.
    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

impl<'a> IntoIterator for &'a HistoryStore {
    type Item = &'a Reading;
    type IntoIter = std::collections::vec_deque::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
