//! Metrics collection for observability
//!
//! Prometheus metrics for the accounting service and rate limiter:
//!
//! - `credits_consumed_total` - Credits consumed across all tenants
//! - `credits_granted_total` - Credits granted across all tenants
//! - `consume_rejections_total` - Consumes rejected for insufficient funds
//! - `rate_limit_rejections_total` - Actions rejected by the rate limiter
//! - `consume_duration_seconds` - Histogram of consume latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Credits consumed
    pub credits_consumed: IntCounter,

    /// Credits granted
    pub credits_granted: IntCounter,

    /// Consume calls rejected for insufficient funds
    pub consume_rejections: IntCounter,

    /// Rate-limited rejections
    pub rate_limit_rejections: IntCounter,

    /// Consume latency histogram
    pub consume_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let credits_consumed =
            IntCounter::new("credits_consumed_total", "Credits consumed across all tenants")?;
        registry.register(Box::new(credits_consumed.clone()))?;

        let credits_granted =
            IntCounter::new("credits_granted_total", "Credits granted across all tenants")?;
        registry.register(Box::new(credits_granted.clone()))?;

        let consume_rejections = IntCounter::new(
            "consume_rejections_total",
            "Consume calls rejected for insufficient funds",
        )?;
        registry.register(Box::new(consume_rejections.clone()))?;

        let rate_limit_rejections = IntCounter::new(
            "rate_limit_rejections_total",
            "Actions rejected by the rate limiter",
        )?;
        registry.register(Box::new(rate_limit_rejections.clone()))?;

        let consume_duration = Histogram::with_opts(
            HistogramOpts::new("consume_duration_seconds", "Histogram of consume latencies")
                .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(consume_duration.clone()))?;

        Ok(Self {
            credits_consumed,
            credits_granted,
            consume_rejections,
            rate_limit_rejections,
            consume_duration,
            registry,
        })
    }

    /// Record a successful consumption
    pub fn record_consume(&self, amount: i64) {
        self.credits_consumed.inc_by(amount.max(0) as u64);
    }

    /// Record a grant
    pub fn record_grant(&self, amount: i64) {
        self.credits_granted.inc_by(amount.max(0) as u64);
    }

    /// Record an insufficient-funds rejection
    pub fn record_consume_rejection(&self) {
        self.consume_rejections.inc();
    }

    /// Record a rate-limit rejection
    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections.inc();
    }

    /// Record consume latency
    pub fn record_consume_duration(&self, duration_seconds: f64) {
        self.consume_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
