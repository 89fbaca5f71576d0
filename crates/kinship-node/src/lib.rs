//! Kinship Node - group assignment service
//!
//! Registers users, places each one in the group whose attributes overlap
//! theirs the most, and serves group lookups over HTTP.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed [`kinship_core::GroupStore`]
//! - **Tokens**: ed25519-signed bearer tokens issued at signin
//! - **Node**: configuration and startup (the group index is loaded before
//!   the HTTP server binds)
//! - **API**: HTTP endpoints for signup, signin and group lookup
//!
//! # Example
//!
//! ```no_run
//! use kinship_node::{KinshipNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = KinshipNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod node;
pub mod storage;
pub mod token;

pub use error::{Error, Result};
pub use node::{KinshipNode, NodeConfig, NodeState};
pub use storage::Storage;
pub use token::TokenIssuer;
