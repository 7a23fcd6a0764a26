//! Readings and per-source history windows.
//!
//! Every source that feeds the validator keeps its own bounded window of
//! past readings. The window is the baseline the anomaly scorer compares
//! new readings against, so it only ever holds readings that were accepted
//! for that same source.
//!
//! # Invariants
//!
//! - A [`HistoryStore`] never holds more than `capacity` readings
//! - Insertion order is chronological order; the oldest reading is evicted first
//! - A store never contains a reading from another source

mod error;
mod reading;
mod store;

pub use error::{HistoryError, Result};
pub use reading::{now_millis, Reading, SourceId};
pub use store::HistoryStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keeps_latest_window() {
        let source = SourceId::new("feed-a");
        let mut store = HistoryStore::new(source.clone(), 3).unwrap();

        for (i, value) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            store.push(Reading::new(source.clone(), value, i as u64).unwrap()).unwrap();
        }

        assert_eq!(store.values(), vec![2.0, 3.0, 4.0]);
    }
}
