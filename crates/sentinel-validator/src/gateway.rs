//! Source gateways: how the validator reaches its data sources.
//!
//! Transport, encoding and authentication are the gateway's business. The
//! validator only needs one reading per source per round, or an error.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use sentinel_history::SourceId;
use tokio::time::Instant;

use crate::error::SourceError;
use sentinel_history::Reading;

/// Fetches one reading from one source.
///
/// `deadline` is the instant the round stops waiting; a gateway may use it
/// to bound its own work. The validator enforces it regardless.
pub trait SourceGateway: Send + Sync {
    /// Fetch the current reading for `source`.
    fn fetch<'a>(
        &'a self,
        source: &'a SourceId,
        deadline: Instant,
    ) -> BoxFuture<'a, Result<Reading, SourceError>>;
}

/// A source id bound to the gateway that serves it.
#[derive(Clone)]
pub struct SourceBinding {
    /// The source this binding fetches.
    pub id: SourceId,
    /// The gateway used to reach it.
    pub gateway: Arc<dyn SourceGateway>,
}

impl SourceBinding {
    /// Bind `id` to `gateway`.
    pub fn new(id: impl Into<SourceId>, gateway: Arc<dyn SourceGateway>) -> Self {
        Self {
            id: id.into(),
            gateway,
        }
    }
}

impl fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBinding").field("id", &self.id).finish_non_exhaustive()
    }
}
