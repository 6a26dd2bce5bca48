//! Credit accounting service
//!
//! High-level API over the ledger store: check, consume and grant per-tenant
//! credits. Every mutating call locks the tenant's balance row, applies the
//! change and appends the matching [`LedgerEntry`] in one atomic WriteBatch,
//! so the balance projection and the ledger can never drift apart mid-flight.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Config, ConsumeRequest, CreditAccounting};
//!
//! #[tokio::main]
//! async fn main() -> credit_ledger::Result<()> {
//!     let accounting = CreditAccounting::open(Config::default())?;
//!
//!     let check = accounting.check_balance(credit_ledger::TenantId::new(), "export_csv")?;
//!     println!("allowed={} balance={}", check.allowed, check.balance);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    config::CostConfig,
    locks::RowLocks,
    metrics::Metrics,
    types::{
        BalanceCheck, ConsumeOutcome, EntryKind, LedgerEntry, TenantBalance, TenantId,
        UNLIMITED_BALANCE,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use uuid::Uuid;

/// Optional parameters for a consume call
#[derive(Debug, Clone, Default)]
pub struct ConsumeRequest {
    /// Override the configured action cost
    pub amount_override: Option<i64>,

    /// Free-text description recorded on the ledger entry
    pub description: Option<String>,

    /// Stable reference id; retried consumes carrying the same reference
    /// are recognized and not double-charged
    pub reference_id: Option<String>,

    /// Arbitrary metadata recorded on the ledger entry
    pub metadata: HashMap<String, String>,
}

/// Credit accounting service
pub struct CreditAccounting {
    /// Ledger store
    storage: Arc<Storage>,

    /// Balance row locks
    locks: RowLocks,

    /// Action cost table
    costs: CostConfig,

    /// Prometheus metrics
    metrics: Metrics,
}

impl CreditAccounting {
    /// Open the store and build the service
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        Self::with_storage(storage, &config)
    }

    /// Build the service over an already-open store
    pub fn with_storage(storage: Arc<Storage>, config: &Config) -> Result<Self> {
        Ok(Self {
            storage,
            locks: RowLocks::new(Duration::from_millis(config.locks.acquire_timeout_ms)),
            costs: config.costs.clone(),
            metrics: Metrics::new()?,
        })
    }

    /// Shared handle to the underlying store
    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Resolve the configured cost for an action key (default if unconfigured)
    pub fn cost_for(&self, action_key: &str) -> i64 {
        self.costs.cost_for(action_key)
    }

    /// Read-only balance probe: would a consume for `action_key` succeed?
    ///
    /// No side effects; safe to call speculatively before showing UI
    /// affordances.
    pub fn check_balance(&self, tenant_id: TenantId, action_key: &str) -> Result<BalanceCheck> {
        let cost = self.costs.cost_for(action_key);
        let balance = self.storage.get_balance(tenant_id)?;

        Ok(BalanceCheck {
            allowed: balance.is_unlimited() || balance.balance >= cost,
            balance: balance.balance,
            required: cost,
        })
    }

    /// Consume credits for an action
    ///
    /// Resolves the cost like [`check_balance`](Self::check_balance), locks
    /// the tenant's balance row, and applies decrement + ledger entry as one
    /// atomic unit. Insufficient balance is a reported outcome, not an error.
    pub async fn consume(
        &self,
        tenant_id: TenantId,
        action_key: &str,
        request: ConsumeRequest,
    ) -> Result<ConsumeOutcome> {
        let start = Instant::now();

        let cost = request
            .amount_override
            .unwrap_or_else(|| self.costs.cost_for(action_key));
        if cost <= 0 {
            return Err(Error::InvariantViolation(format!(
                "consume cost must be positive, got {}",
                cost
            )));
        }

        let _guard = self.locks.acquire(tenant_id.as_bytes().to_vec()).await?;

        // Idempotent retry: a consumption already recorded under this
        // reference is acknowledged without a second charge
        if let Some(ref reference) = request.reference_id {
            if self
                .storage
                .find_entry_by_reference(tenant_id, false, reference)?
                .is_some()
            {
                let balance = self.storage.get_balance(tenant_id)?;
                tracing::debug!(
                    tenant_id = %tenant_id,
                    reference_id = %reference,
                    "Duplicate consumption reference, no charge applied"
                );
                return Ok(ConsumeOutcome::Duplicate {
                    new_balance: balance.balance,
                });
            }
        }

        let mut balance = self.storage.get_balance(tenant_id)?;

        // Unlimited tenants pay nothing but still leave an audit entry
        let consumed = if balance.is_unlimited() { 0 } else { cost };

        if !balance.is_unlimited() && balance.balance < cost {
            self.metrics.record_consume_rejection();
            tracing::debug!(
                tenant_id = %tenant_id,
                action_key,
                balance = balance.balance,
                required = cost,
                "Consume rejected: insufficient funds"
            );
            return Ok(ConsumeOutcome::InsufficientFunds {
                balance: balance.balance,
                required: cost,
            });
        }

        if consumed > 0 {
            // Free credits are spent before purchased ones
            let free_spend = balance.free_balance.min(consumed);
            balance.free_balance -= free_spend;
            balance.purchased_balance -= consumed - free_spend;
            balance.balance -= consumed;
        }
        // Tracks what was actually decremented, matching the entry amount;
        // unlimited tenants spend nothing
        balance.lifetime_spent += consumed;
        balance.updated_at = Utc::now();

        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            tenant_id,
            amount: -consumed,
            balance_after: balance.balance,
            kind: EntryKind::Consumption,
            action_key: Some(action_key.to_string()),
            description: request.description,
            reference_id: request.reference_id,
            metadata: request.metadata,
            created_at: Utc::now(),
        };

        self.storage.append_entry_atomic(&balance, &entry)?;

        self.metrics.record_consume(consumed);
        self.metrics
            .record_consume_duration(start.elapsed().as_secs_f64());

        tracing::info!(
            tenant_id = %tenant_id,
            action_key,
            consumed,
            new_balance = balance.balance,
            "Credits consumed"
        );

        Ok(ConsumeOutcome::Consumed {
            consumed,
            new_balance: balance.balance,
        })
    }

    /// Grant credits to a tenant
    ///
    /// Safe to call twice with the same `reference_id`: the second call
    /// returns the current balance without granting again.
    pub async fn grant(
        &self,
        tenant_id: TenantId,
        amount: i64,
        kind: EntryKind,
        description: impl Into<String>,
        reference_id: impl Into<String>,
    ) -> Result<i64> {
        if amount <= 0 {
            return Err(Error::InvariantViolation(format!(
                "grant amount must be positive, got {}",
                amount
            )));
        }
        if !kind.is_grant() {
            return Err(Error::InvariantViolation(
                "grant cannot record a consumption entry".to_string(),
            ));
        }

        let reference_id = reference_id.into();
        let _guard = self.locks.acquire(tenant_id.as_bytes().to_vec()).await?;

        if self
            .storage
            .find_entry_by_reference(tenant_id, true, &reference_id)?
            .is_some()
        {
            let balance = self.storage.get_balance(tenant_id)?;
            tracing::debug!(
                tenant_id = %tenant_id,
                reference_id = %reference_id,
                "Duplicate grant reference, not granted again"
            );
            return Ok(balance.balance);
        }

        let mut balance = self.storage.get_balance(tenant_id)?;

        if !balance.is_unlimited() {
            match kind {
                // Signup bonuses and scheduled grants replenish the
                // expiring free bucket
                EntryKind::Grant | EntryKind::SignupBonus => balance.free_balance += amount,
                // Refunds and repairs restore paid-for credits
                EntryKind::Refund | EntryKind::Repair => balance.purchased_balance += amount,
                EntryKind::Consumption => unreachable!("rejected above"),
            }
            balance.balance += amount;
        }
        balance.lifetime_earned += amount;
        balance.updated_at = Utc::now();

        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            tenant_id,
            amount,
            balance_after: balance.balance,
            kind,
            action_key: None,
            description: Some(description.into()),
            reference_id: Some(reference_id),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };

        self.storage.append_entry_atomic(&balance, &entry)?;
        self.metrics.record_grant(amount);

        tracing::info!(
            tenant_id = %tenant_id,
            amount,
            kind = ?kind,
            new_balance = balance.balance,
            "Credits granted"
        );

        Ok(balance.balance)
    }

    /// Administrative balance overwrite
    ///
    /// Resets the row to the target values rather than stacking onto it.
    /// Provisioning must use [`seed_balance_if_absent`](Self::seed_balance_if_absent)
    /// instead: an unconditional overwrite racing a grant would clobber the
    /// granted balance.
    pub async fn upsert_balance(&self, target: TenantBalance) -> Result<()> {
        if !target.buckets_consistent() {
            return Err(Error::InvariantViolation(format!(
                "balance {} != free {} + purchased {}",
                target.balance, target.free_balance, target.purchased_balance
            )));
        }

        let _guard = self
            .locks
            .acquire(target.tenant_id.as_bytes().to_vec())
            .await?;
        self.storage.put_balance(&target)
    }

    /// Seed a balance row only when none exists yet
    ///
    /// The existence check runs under the tenant's row lock, so of two
    /// racing provisioning attempts exactly one seeds; the loser cannot
    /// reset a row the winner (or a subsequent grant) already wrote.
    /// Returns whether the row was written.
    pub async fn seed_balance_if_absent(&self, target: TenantBalance) -> Result<bool> {
        if !target.buckets_consistent() {
            return Err(Error::InvariantViolation(format!(
                "balance {} != free {} + purchased {}",
                target.balance, target.free_balance, target.purchased_balance
            )));
        }

        let _guard = self
            .locks
            .acquire(target.tenant_id.as_bytes().to_vec())
            .await?;

        if self.storage.balance_exists(target.tenant_id)? {
            return Ok(false);
        }

        self.storage.put_balance(&target)?;
        Ok(true)
    }

    /// Recompute the balance from the entry log
    ///
    /// The ledger is the source of truth; this folds every entry's signed
    /// amount. Returns the sentinel untouched for unlimited tenants.
    pub fn replay_balance(&self, tenant_id: TenantId) -> Result<i64> {
        let balance = self.storage.get_balance(tenant_id)?;
        if balance.is_unlimited() {
            return Ok(UNLIMITED_BALANCE);
        }

        let entries = self.storage.tenant_entries(tenant_id)?;
        Ok(entries
            .iter()
            .filter(|e| e.balance_after != UNLIMITED_BALANCE)
            .map(|e| e.amount)
            .sum())
    }

    /// Reconcile the cached projection with the ledger
    ///
    /// If they diverge, the projection is rebuilt from the replayed sum and
    /// an amount-zero [`EntryKind::Repair`] entry records the operation;
    /// history is never edited. Returns the corrected balance, or `None` if
    /// the projection was already consistent.
    pub async fn repair_balance(&self, tenant_id: TenantId) -> Result<Option<i64>> {
        let _guard = self.locks.acquire(tenant_id.as_bytes().to_vec()).await?;

        let mut balance = self.storage.get_balance(tenant_id)?;
        if balance.is_unlimited() {
            return Ok(None);
        }

        let entries = self.storage.tenant_entries(tenant_id)?;
        let replayed: i64 = entries
            .iter()
            .filter(|e| e.balance_after != UNLIMITED_BALANCE)
            .map(|e| e.amount)
            .sum();

        if replayed == balance.balance {
            return Ok(None);
        }

        let projected = balance.balance;
        tracing::warn!(
            tenant_id = %tenant_id,
            projected,
            replayed,
            "Balance projection diverged from ledger, rebuilding"
        );

        balance.balance = replayed;
        // Purchased credits are the stable bucket; the free bucket absorbs
        // the correction
        balance.free_balance = replayed - balance.purchased_balance;
        if balance.free_balance < 0 {
            balance.purchased_balance += balance.free_balance;
            balance.free_balance = 0;
        }
        balance.updated_at = Utc::now();

        let mut metadata = HashMap::new();
        metadata.insert("projected".to_string(), projected.to_string());
        metadata.insert("replayed".to_string(), replayed.to_string());

        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            tenant_id,
            amount: 0,
            balance_after: replayed,
            kind: EntryKind::Repair,
            action_key: None,
            description: Some("projection rebuilt from ledger".to_string()),
            reference_id: Some(format!("repair:{}:{}", tenant_id, entries.len())),
            metadata,
            created_at: Utc::now(),
        };

        self.storage.append_entry_atomic(&balance, &entry)?;

        Ok(Some(replayed))
    }
}
