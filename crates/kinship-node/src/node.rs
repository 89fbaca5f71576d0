//! Kinship Node - the main application entry point.
//!
//! Architecture:
//! - Single process with one RocksDB store
//! - One assignment service (and group index) shared by all requests
//! - HTTP API for signup, signin and group lookup

use crate::api;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::token::TokenIssuer;
use kinship_core::{AssignmentConfig, AssignmentService, ConsistencyMode, DEFAULT_MATCH_THRESHOLD};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a Kinship node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Upper bound on a single request's store work
    pub request_timeout: Duration,

    /// Matching threshold and consistency mode
    pub assignment: AssignmentConfig,
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(
            lookup("KINSHIP_DATA_DIR").unwrap_or_else(|| "./kinship-data".to_string()),
        );

        let api_addr: SocketAddr = parse_var(&lookup, "KINSHIP_API_ADDR", "0.0.0.0:8080".parse().ok())?;

        let timeout_ms: u64 = parse_var(&lookup, "KINSHIP_REQUEST_TIMEOUT_MS", Some(5000))?;

        let match_threshold = parse_var(
            &lookup,
            "KINSHIP_MATCH_THRESHOLD",
            Some(DEFAULT_MATCH_THRESHOLD),
        )?;

        let consistency = match lookup("KINSHIP_CONSISTENCY") {
            Some(raw) => raw
                .parse::<ConsistencyMode>()
                .map_err(|e| Error::Config(format!("KINSHIP_CONSISTENCY: {}", e)))?,
            None => ConsistencyMode::default(),
        };

        Ok(Self {
            data_dir,
            api_addr,
            request_timeout: Duration::from_millis(timeout_ms),
            assignment: AssignmentConfig {
                match_threshold,
                consistency,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: Option<T>) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {} '{}': {}", name, raw, e))),
        None => default.ok_or_else(|| Error::Config(format!("{} is required", name))),
    }
}

/// Shared state for the node - one store and one assignment service.
pub struct NodeState {
    pub service: AssignmentService<Arc<Storage>>,
    pub tokens: TokenIssuer,
    pub config: NodeConfig,
}

impl NodeState {
    /// Open storage and load the group index.
    ///
    /// Fails if the store cannot be opened or its groups cannot be listed,
    /// in which case the node must not start serving.
    pub fn open(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(&config.data_dir)?);
        let tokens = TokenIssuer::new(storage.get_or_create_node_key()?);
        let service = AssignmentService::new(storage, config.assignment)?;

        Ok(Self {
            service,
            tokens,
            config,
        })
    }
}

/// A Kinship node instance.
pub struct KinshipNode {
    state: Arc<NodeState>,
}

impl KinshipNode {
    /// Create a new node. Storage is opened and the group index loaded
    /// before this returns.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let state = tokio::task::spawn_blocking(move || NodeState::open(config))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        Ok(Self {
            state: Arc::new(state),
        })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts the HTTP server).
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("Kinship node starting");
        tracing::info!("  API: http://{}", config.api_addr);
        tracing::info!("  Data: {:?}", config.data_dir);
        tracing::info!("  Groups indexed: {}", self.state.service.index().len());

        let app = api::build_router(self.state());

        let listener = tokio::net::TcpListener::bind(config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
