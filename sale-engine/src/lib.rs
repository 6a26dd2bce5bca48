//! Atomic commerce transaction engine
//!
//! Multi-line sales executed all-or-nothing against per-tenant inventory,
//! with event-driven platform fee derivation.
//!
//! # Architecture
//!
//! - **Two-phase execution**: every product row the sale touches is locked
//!   up front; all lines are validated against available stock before any
//!   write, then the sale, stock decrements, audit rows and accumulators
//!   commit in one RocksDB WriteBatch
//! - **Complete rejection reports**: a sale that cannot be covered returns
//!   every offending line, not just the first
//! - **Post-commit events**: confirmation events publish only after the
//!   batch is durable; the fee consumer is idempotent per sale
//!
//! # Invariants
//!
//! - Stock never goes negative; reserved stock is never sellable
//! - `total = subtotal + tax - discount`, computed once at commit
//! - Transaction numbers are unique per tenant
//! - At most one platform fee exists per sale

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod events;
pub mod fees;
pub mod metrics;
pub mod processor;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, FeeConfig, SaleConfig};
pub use error::{Error, Result};
pub use events::{EventBus, SaleEvent};
pub use fees::FeeCalculator;
pub use metrics::Metrics;
pub use processor::SaleProcessor;
pub use storage::Storage;
pub use types::{
    AlertLevel, CustomerLoyalty, FeeStatus, FeeTransaction, InsufficientLine, InventoryItem,
    LineItemInput, MovementReason, OrderChannel, PaymentMethod, PaymentStatus, ProductId,
    SaleLine, SaleOutcome, SaleRequest, SaleTransaction, ShiftSession, StockAlert, StockMovement,
    UnifiedOrder,
};
