//! Sentinel node binary
//!
//! Runs validation rounds over a replayed source feed.

use sentinel_node::{NodeConfig, SentinelNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_node=info,sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sentinel node");

    let config = NodeConfig::from_env()?;

    let mut node = SentinelNode::from_config(config)?;
    node.run().await?;

    Ok(())
}
