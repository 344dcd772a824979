//! Error types for the settlement engine

use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Registry error (storage, lookup, duplicate key)
    #[error("Registry error: {0}")]
    Registry(#[from] registry_core::Error),

    /// Malformed or missing arguments, wrong argument count
    #[error("Validation error: {0}")]
    Validation(String),

    /// Role or ownership mismatch
    #[error("Authorization error: {0}")]
    Unauthorized(String),

    /// Payment dispatch failure
    #[error("External call error: {0}")]
    ExternalCall(String),

    /// Response serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for missing bond/contract/trade lookups
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Registry(registry_core::Error::NotFound(_)))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
