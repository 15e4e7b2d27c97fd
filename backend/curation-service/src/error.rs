/// Error types for curation-service
use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CurationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed candidate: {0}")]
    MalformedCandidate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for curation operations
pub type Result<T> = std::result::Result<T, CurationError>;
