//! Error types for the credit ledger

use thiserror::Error;

/// Result type for credit ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Credit ledger errors
///
/// Business outcomes that callers must branch on (insufficient funds,
/// rate limit exceeded) are *not* errors; they are reported as result
/// values by the accounting service and rate limiter. This enum covers
/// failures of the store and the operation preconditions.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Tenant has no balance record. This signals a provisioning bug and
    /// is surfaced loudly rather than defaulted to a zero balance.
    #[error("Tenant not provisioned: {0}")]
    NotProvisioned(String),

    /// Tenant record not found
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Ledger entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Row lock could not be acquired within the configured timeout.
    /// Transient; the whole operation is safe to retry from scratch.
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(String),

    /// Invariant violation (non-positive amount, zero-quantity line, etc.).
    /// Rejected before any lock is taken; nothing is partially applied.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(String),

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
        matches!(self, Error::LockTimeout(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
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
