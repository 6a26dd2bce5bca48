//! Post-commit sale events
//!
//! Events are published only after the sale's WriteBatch has landed, so a
//! consumer never observes a sale that later vanished. Delivery is
//! at-least-once from the consumer's point of view (a restarted consumer
//! may be handed an already-processed sale), so consumers must be
//! idempotent.

use credit_ledger::TenantId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Event emitted by the sale processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SaleEvent {
    /// A sale committed successfully
    Confirmed {
        /// Owning tenant
        tenant_id: TenantId,
        /// Sale ID
        sale_id: Uuid,
        /// Transaction number
        transaction_number: String,
        /// Sale total
        total: Decimal,
    },
}

/// Publishing half of the sale event channel
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<SaleEvent>,
}

impl EventBus {
    /// Create a bounded event channel, returning the bus and its receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SaleEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Publish an event. A closed channel (consumer gone) is logged and
    /// swallowed: the sale itself is already durable, and idempotent
    /// consumers re-derive from storage on restart.
    pub async fn publish(&self, event: SaleEvent) {
        if let Err(e) = self.tx.send(event).await {
            tracing::warn!(error = %e, "Sale event dropped, no consumer attached");
        }
    }
}
