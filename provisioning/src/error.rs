//! Error types for tenant provisioning

use thiserror::Error;

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;

/// Provisioning errors
#[derive(Error, Debug)]
pub enum Error {
    /// Credit ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] credit_ledger::Error),

    /// Owner email failed validation
    #[error("Invalid owner email: {0}")]
    InvalidEmail(String),

    /// Unknown plan name
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),
}

impl Error {
    /// Whether the caller may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Ledger(inner) if inner.is_retryable())
    }
}
