//! Error types for the registry core

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Registry errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing bond/contract/trade
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists under the same key
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backing store failure (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
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
