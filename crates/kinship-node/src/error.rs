//! Error types for the Kinship node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while starting or running a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Assignment or storage error
    #[error(transparent)]
    Assignment(#[from] kinship_core::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
