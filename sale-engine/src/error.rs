//! Error types for the sale engine

use thiserror::Error;
use uuid::Uuid;

/// Result type for sale engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Sale engine errors
///
/// Insufficient stock is *not* here: it is a reported outcome
/// ([`crate::SaleOutcome::InsufficientStock`]) enumerating every offending
/// line, so the caller can show the complete correction list at once.
#[derive(Error, Debug)]
pub enum Error {
    /// Credit ledger error (row locks, shared types)
    #[error("Ledger error: {0}")]
    Ledger(#[from] credit_ledger::Error),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Product does not exist for this tenant
    #[error("Unknown product: {0}")]
    UnknownProduct(Uuid),

    /// Sale transaction not found
    #[error("Sale not found: {0}")]
    SaleNotFound(Uuid),

    /// Invariant violation (zero quantity, negative price/total).
    /// Rejected before any lock is taken; nothing is partially applied.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Transaction number generation exhausted its retries
    #[error("Transaction number collision: {0}")]
    TransactionNumber(String),

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

impl Error {
    /// Whether the caller may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Ledger(inner) if inner.is_retryable())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Other(format!("Metrics error: {}", err))
    }
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
