//! Tenant provisioning orchestration
//!
//! Turns a signup (or a billing webhook replaying one) into a fully
//! provisioned tenant: a seeded credit balance, the plan's signup
//! allocation recorded in the ledger, and the tenant, owner-membership
//! and subscription-event rows. Every step is idempotent; calling
//! [`Provisioner::provision`] twice with the same request is a no-op the
//! second time.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod orchestrator;
pub mod plan;

// Re-exports
pub use error::{Error, Result};
pub use orchestrator::{ProvisionReceipt, ProvisionRequest, Provisioner};
pub use plan::{PlanLimits, PlanTier};
