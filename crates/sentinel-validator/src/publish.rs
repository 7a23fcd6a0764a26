//! Publishing round outcomes to consumers.
//!
//! Only round-level results cross this boundary. Per-source failures are
//! folded into the outcome before it gets here.

use tokio::sync::broadcast;
use tracing::{info, trace, warn};

use crate::round::{Rejection, RoundOutcome, ValidatedReading};

/// Receives the outcome of every round.
pub trait Publisher: Send + Sync {
    /// A value was validated.
    fn on_validated(&self, reading: &ValidatedReading);

    /// A round was rejected.
    fn on_rejected(&self, rejection: &Rejection);

    /// Dispatch an outcome to the matching callback.
    fn publish(&self, outcome: &RoundOutcome) {
        match outcome {
            RoundOutcome::Validated(reading) => self.on_validated(reading),
            RoundOutcome::Rejected(rejection) => self.on_rejected(rejection),
        }
    }
}

/// Logs every outcome through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn on_validated(&self, reading: &ValidatedReading) {
        info!(
            round = reading.round,
            value = reading.value,
            confidence = reading.confidence,
            supporting = reading.supporting.len(),
            dissenting = reading.dissenting.len(),
            unavailable = reading.unavailable.len(),
            "Round validated"
        );
    }

    fn on_rejected(&self, rejection: &Rejection) {
        warn!(
            round = rejection.round,
            reason = %rejection.reason,
            "Round rejected"
        );
    }
}

/// Fans outcomes out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: broadcast::Sender<RoundOutcome>,
}

impl ChannelPublisher {
    /// Create a publisher buffering up to `capacity` outcomes per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<RoundOutcome> {
        self.tx.subscribe()
    }

    fn send(&self, outcome: RoundOutcome) {
        if self.tx.send(outcome).is_err() {
            trace!("No outcome subscribers");
        }
    }
}

impl Publisher for ChannelPublisher {
    fn on_validated(&self, reading: &ValidatedReading) {
        self.send(RoundOutcome::Validated(reading.clone()));
    }

    fn on_rejected(&self, rejection: &Rejection) {
        self.send(RoundOutcome::Rejected(rejection.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::{RejectionReason, ValidationRound};
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn channel_publisher_forwards_outcomes() {
        let publisher = ChannelPublisher::new(8);
        let mut rx = publisher.subscribe();

        let validated =
            ValidationRound::new(1, 0).validate(4.2, BTreeSet::new(), BTreeSet::new(), 3);
        let rejected = ValidationRound::new(2, 0).reject(RejectionReason::InsufficientQuorum {
            received: 1,
            required: 3,
        });
        publisher.publish(&validated);
        publisher.publish(&rejected);

        assert_eq!(rx.recv().await.unwrap(), validated);
        assert_eq!(rx.recv().await.unwrap(), rejected);
    }

    #[test]
    fn channel_publisher_without_subscribers_does_not_panic() {
        let publisher = ChannelPublisher::new(1);
        let outcome = ValidationRound::new(1, 0).reject(RejectionReason::NoInliers {
            responded: 0,
            anomalous: 0,
        });
        publisher.publish(&outcome);
        LogPublisher.publish(&outcome);
    }
}
