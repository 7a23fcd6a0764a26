//! Sentinel node.
//!
//! Wires an [`IntegrityValidator`](sentinel_validator::IntegrityValidator)
//! to replayed sources described by a JSON feed, and runs validation rounds
//! on a fixed interval.

pub mod config;
pub mod error;
pub mod feed;
pub mod node;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use feed::{Feed, ReplayGateway, SourceFeed};
pub use node::SentinelNode;
