//! Event-driven platform fee derivation
//!
//! A [`FeeCalculator`] consumes confirmation events and records one fee
//! per sale. Deriving the fee from the event rather than inline in the
//! sale path keeps fee policy changes out of the hot commit path.
//! Uniqueness is keyed on the sale ID, so redelivered or duplicate events
//! are absorbed without double-charging.

use crate::{
    config::FeeConfig,
    error::Result,
    events::SaleEvent,
    metrics::Metrics,
    storage::Storage,
    types::{FeeStatus, FeeTransaction},
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Derives platform fees from confirmed sales
pub struct FeeCalculator {
    storage: Arc<Storage>,
    rate: Decimal,
    metrics: Option<Metrics>,
}

impl FeeCalculator {
    /// Build a calculator over the given storage
    pub fn new(storage: Arc<Storage>, config: &FeeConfig) -> Self {
        Self {
            storage,
            rate: config.platform_rate,
            metrics: None,
        }
    }

    /// Attach metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle one event. Returns the fee if one was newly recorded.
    ///
    /// Per-sale uniqueness relies on this being the only fee writer for
    /// the store: the check-and-put in the fees column family is serialized
    /// by the single event receiver, not by the store itself. Do not run
    /// two calculators against one store.
    pub fn handle(&self, event: &SaleEvent) -> Result<Option<FeeTransaction>> {
        let SaleEvent::Confirmed {
            tenant_id,
            sale_id,
            transaction_number,
            total,
        } = event;

        let fee = FeeTransaction {
            fee_id: Uuid::now_v7(),
            sale_id: *sale_id,
            tenant_id: *tenant_id,
            sale_total: *total,
            rate: self.rate,
            amount: (*total * self.rate).round_dp(2),
            status: FeeStatus::Pending,
            created_at: Utc::now(),
        };

        if !self.storage.insert_fee_if_absent(&fee)? {
            tracing::debug!(
                sale_id = %sale_id,
                "Duplicate confirmation event, fee already recorded"
            );
            return Ok(None);
        }

        if let Some(metrics) = &self.metrics {
            metrics.fees_recorded.inc();
        }

        tracing::info!(
            tenant_id = %tenant_id,
            sale_id = %sale_id,
            transaction_number = %transaction_number,
            amount = %fee.amount,
            "Platform fee recorded"
        );

        Ok(Some(fee))
    }

    /// Consume events until the channel closes. Spawn this on its own task.
    pub async fn run(self, mut rx: mpsc::Receiver<SaleEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle(&event) {
                // The sale is durable; a failed fee write is retried on the
                // next delivery of the same sale
                tracing::error!(error = %e, "Fee derivation failed");
            }
        }
        tracing::debug!("Fee calculator stopped, event channel closed");
    }
}
