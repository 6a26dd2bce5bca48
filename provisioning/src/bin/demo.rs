//! End-to-end walkthrough binary
//!
//! Provisions a tenant, spends and rate-limits credits, runs sales with
//! the fee pipeline attached, and finishes with a ledger repair check.

use anyhow::Context;
use chrono::Utc;
use credit_ledger::{ConsumeRequest, CreditAccounting, RateLimiter};
use provisioning::{PlanTier, ProvisionRequest, Provisioner};
use rust_decimal::Decimal;
use sale_engine::{
    EventBus, FeeCalculator, InventoryItem, LineItemInput, PaymentMethod, ProductId, SaleOutcome,
    SaleProcessor, SaleRequest,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting walkthrough");

    let ledger_config = credit_ledger::Config::from_env().context("ledger config")?;
    let mut sale_config = sale_engine::Config::from_env().context("sale config")?;
    sale_config.sale.tax_rate = Decimal::new(8, 2); // 8%

    // Provision a tenant on the free plan
    let accounting = Arc::new(CreditAccounting::open(ledger_config).context("open ledger")?);
    let provisioner = Provisioner::new(accounting.clone());

    let receipt = provisioner
        .provision(&ProvisionRequest {
            business_name: "Corner Store".to_string(),
            owner_email: "owner@corner.example".to_string(),
            tier: PlanTier::Free,
        })
        .await?;
    let tenant_id = receipt.tenant_id;
    tracing::info!(%tenant_id, balance = receipt.balance, "Provisioned");

    // Spend some credits
    let outcome = accounting
        .consume(tenant_id, "export_csv", ConsumeRequest::default())
        .await?;
    tracing::info!(?outcome, "Consumed export_csv");

    // Rate limit: 5 bulk imports per day
    let limiter = RateLimiter::new(accounting.storage());
    for attempt in 1..=6u32 {
        let decision = limiter
            .check_and_log(tenant_id, "bulk_import", 5, 24)
            .await?;
        tracing::info!(attempt, allowed = decision.allowed, remaining = decision.remaining);
    }

    // Sales with the fee pipeline attached
    let (bus, rx) = EventBus::channel(32);
    let processor = SaleProcessor::open(&sale_config)
        .context("open sale engine")?
        .with_events(bus);
    let fees = FeeCalculator::new(processor.storage().clone(), &sale_config.fees);
    let fee_task = tokio::spawn(fees.run(rx));

    let product_id = ProductId::new();
    processor.upsert_item(&InventoryItem {
        tenant_id,
        product_id,
        name: "House Blend 250g".to_string(),
        on_hand: 20,
        reserved: 0,
        low_stock_threshold: 8,
        in_stock: true,
        updated_at: Utc::now(),
    })?;

    for quantity in [3i64, 12, 10] {
        let outcome = processor
            .execute_sale(
                tenant_id,
                SaleRequest {
                    line_items: vec![LineItemInput {
                        product_id,
                        quantity,
                        unit_price: Decimal::new(1250, 2),
                    }],
                    payment_method: PaymentMethod::Card,
                    discount: Decimal::ZERO,
                    shift_ref: None,
                    customer_ref: None,
                },
            )
            .await?;

        match outcome {
            SaleOutcome::Completed {
                transaction_number,
                total,
                warnings,
                ..
            } => tracing::info!(%transaction_number, %total, warnings = warnings.len(), "Sale completed"),
            SaleOutcome::InsufficientStock { lines } => {
                for line in lines {
                    tracing::warn!(
                        product = %line.name,
                        requested = line.requested,
                        available = line.available,
                        "Sale rejected"
                    );
                }
            }
        }
    }

    // Projection self-check: replay the ledger and repair if diverged
    match accounting.repair_balance(tenant_id).await? {
        Some(corrected) => tracing::warn!(corrected, "Projection repaired"),
        None => tracing::info!("Projection matches ledger replay"),
    }

    drop(processor);
    fee_task.await?;

    tracing::info!("Walkthrough finished");
    Ok(())
}
