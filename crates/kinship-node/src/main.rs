//! Kinship Node binary
//!
//! Serves signup, signin and group lookup over HTTP.

use kinship_node::{KinshipNode, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kinship_node=info,kinship_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kinship node");

    let config = NodeConfig::from_env()?;

    // The node refuses to start if the group index cannot be loaded
    let node = KinshipNode::new(config).await?;
    node.run().await?;

    Ok(())
}
