//! Rate limiting over the action log
//!
//! Fixed-window counter: an action is allowed while fewer than `limit`
//! allowed-action rows exist within the trailing window, and each allowed
//! action appends one row. Counting a trailing window over a fixed log can
//! admit slightly more than `limit` actions right at a window boundary;
//! that imprecision is an accepted cost/complexity tradeoff, not part of
//! the contract.

use crate::{
    metrics::Metrics,
    types::{ActionLogEntry, RateDecision, TenantId},
    Error, Result, Storage,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Rate limiter backed by the append-only action log
pub struct RateLimiter {
    storage: Arc<Storage>,
    metrics: Option<Metrics>,
}

impl RateLimiter {
    /// Build a limiter over the shared store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            metrics: None,
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Check the window and, if under the limit, log the action
    ///
    /// At or over the limit nothing is written and `allowed` is false;
    /// `reset_at` reports when the oldest in-window action ages out.
    pub async fn check_and_log(
        &self,
        tenant_id: TenantId,
        action_type: &str,
        limit: u32,
        window_hours: i64,
    ) -> Result<RateDecision> {
        if limit == 0 || window_hours <= 0 {
            return Err(Error::InvariantViolation(format!(
                "rate limit requires limit > 0 and window > 0, got limit={} window={}h",
                limit, window_hours
            )));
        }

        let now = Utc::now();
        let window = Duration::hours(window_hours);
        let cutoff = now - window;

        let (used, oldest) = self
            .storage
            .actions_in_window(tenant_id, action_type, cutoff)?;

        if used >= limit {
            if let Some(ref metrics) = self.metrics {
                metrics.record_rate_limit_rejection();
            }

            let reset_at = oldest.map(|o| o + window).unwrap_or(now);
            tracing::debug!(
                tenant_id = %tenant_id,
                action_type,
                used,
                limit,
                reset_at = %reset_at,
                "Action rate limited"
            );

            return Ok(RateDecision {
                allowed: false,
                used,
                remaining: 0,
                reset_at,
            });
        }

        let action = ActionLogEntry {
            log_id: Uuid::now_v7(),
            tenant_id,
            action_type: action_type.to_string(),
            created_at: now,
        };
        self.storage.append_action(&action)?;

        let used = used + 1;
        let reset_at = oldest.unwrap_or(now) + window;

        Ok(RateDecision {
            allowed: true,
            used,
            remaining: limit - used,
            reset_at,
        })
    }
}
