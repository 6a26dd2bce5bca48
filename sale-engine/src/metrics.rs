//! Prometheus metrics for the sale engine

use crate::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Sale engine metrics, registered against a per-instance registry
#[derive(Clone)]
pub struct Metrics {
    /// Sales committed
    pub sales_completed: IntCounter,

    /// Sales rejected for insufficient stock
    pub sales_rejected_stock: IntCounter,

    /// Platform fees recorded
    pub fees_recorded: IntCounter,

    /// End-to-end sale execution latency
    pub sale_duration: Histogram,

    registry: Arc<Registry>,
}

impl Metrics {
    /// Create metrics with a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sales_completed =
            IntCounter::new("sale_engine_sales_completed_total", "Sales committed")?;
        let sales_rejected_stock = IntCounter::new(
            "sale_engine_sales_rejected_stock_total",
            "Sales rejected for insufficient stock",
        )?;
        let fees_recorded =
            IntCounter::new("sale_engine_fees_recorded_total", "Platform fees recorded")?;
        let sale_duration = Histogram::with_opts(
            HistogramOpts::new("sale_engine_sale_duration_seconds", "Sale execution latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(sales_completed.clone()))?;
        registry.register(Box::new(sales_rejected_stock.clone()))?;
        registry.register(Box::new(fees_recorded.clone()))?;
        registry.register(Box::new(sale_duration.clone()))?;

        Ok(Self {
            sales_completed,
            sales_rejected_stock,
            fees_recorded,
            sale_duration,
            registry: Arc::new(registry),
        })
    }

    /// The registry backing these metrics (for scrape endpoints)
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
