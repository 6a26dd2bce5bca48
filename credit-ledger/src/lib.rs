//! Tenant credit ledger
//!
//! Append-only credit ledger with a per-tenant balance projection, the
//! accounting service that consumes and grants against it, and the
//! action-log rate limiter.
//!
//! # Architecture
//!
//! - **Ledger as source of truth**: every balance change appends an
//!   immutable [`LedgerEntry`]; the balance row is a cached projection
//! - **Row locking**: each mutating operation locks the tenant's balance
//!   row for its whole unit of work, serializing concurrent consumes
//! - **Atomic commits**: balance projection, entry and indices land in one
//!   RocksDB WriteBatch per operation
//!
//! # Invariants
//!
//! - Balance never goes negative (or carries the unlimited sentinel)
//! - `balance == free_balance + purchased_balance` after every mutation
//! - Entry N's balance snapshot equals the projection after applying N
//! - Entries are never modified or deleted; corrections are new entries

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounting;
pub mod config;
pub mod error;
pub mod locks;
pub mod metrics;
pub mod ratelimit;
pub mod storage;
pub mod types;

// Re-exports
pub use accounting::{ConsumeRequest, CreditAccounting};
pub use config::{Config, CostConfig, LockConfig, RocksDbConfig};
pub use error::{Error, Result};
pub use locks::{RowGuard, RowLocks};
pub use metrics::Metrics;
pub use ratelimit::RateLimiter;
pub use storage::Storage;
pub use types::{
    ActionLogEntry, BalanceCheck, ConsumeOutcome, EntryKind, LedgerEntry, MemberRole, Membership,
    PlanStatus, RateDecision, SubscriptionEvent, Tenant, TenantBalance, TenantId,
    UNLIMITED_BALANCE,
};
