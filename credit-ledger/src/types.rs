//! Core types for the credit ledger
//!
//! The ledger is the source of truth: `TenantBalance` is a cached
//! projection of the append-only `LedgerEntry` log, and any divergence is
//! corrected by appending a compensating entry, never by editing history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Sentinel balance meaning "unlimited credits" (trial tenants)
pub const UNLIMITED_BALANCE: i64 = -1;

/// Tenant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Create new random tenant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Raw bytes (storage key prefix)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription tier status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    /// Free tier
    Free,
    /// Paid tier
    Paid,
}

/// Current credit balance for one tenant (cached projection of the ledger)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantBalance {
    /// Tenant this balance belongs to
    pub tenant_id: TenantId,

    /// Current balance; `UNLIMITED_BALANCE` or >= 0
    pub balance: i64,

    /// Free-credit sub-balance (expires with the tier)
    pub free_balance: i64,

    /// Purchased sub-balance (never expires)
    pub purchased_balance: i64,

    /// Lifetime credits earned
    pub lifetime_earned: i64,

    /// Lifetime credits spent
    pub lifetime_spent: i64,

    /// Tier status
    pub tier: PlanStatus,

    /// When the free sub-balance expires (trial/free tier)
    pub free_expires_at: Option<DateTime<Utc>>,

    /// Next scheduled free-credit grant
    pub next_grant_at: Option<DateTime<Utc>>,

    /// Soft-suspended with the tenant; never hard-deleted
    pub suspended: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl TenantBalance {
    /// Fresh balance row with every counter at zero
    pub fn new(tenant_id: TenantId, tier: PlanStatus) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            balance: 0,
            free_balance: 0,
            purchased_balance: 0,
            lifetime_earned: 0,
            lifetime_spent: 0,
            tier,
            free_expires_at: None,
            next_grant_at: None,
            suspended: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this tenant has the unlimited sentinel balance
    pub fn is_unlimited(&self) -> bool {
        self.balance == UNLIMITED_BALANCE
    }

    /// Check the sub-balance invariant: balance == free + purchased
    /// (vacuously true for the unlimited sentinel)
    pub fn buckets_consistent(&self) -> bool {
        self.is_unlimited() || self.balance == self.free_balance + self.purchased_balance
    }
}

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    /// Manual or scheduled grant
    Grant = 1,
    /// Consumption of credits by an action
    Consumption = 2,
    /// Refund of a prior consumption
    Refund = 3,
    /// One-time signup bonus
    SignupBonus = 4,
    /// Compensating entry appended when projection and replay diverge
    Repair = 5,
}

impl EntryKind {
    /// Entries fall into two reference-uniqueness classes: credits in
    /// (grants) and credits out (consumptions). A grant and a consumption
    /// may legitimately share one reference string (e.g. an order id).
    pub fn is_grant(&self) -> bool {
        !matches!(self, EntryKind::Consumption)
    }
}

/// Immutable, append-only ledger entry
///
/// `balance_after` snapshots the tenant balance immediately after this
/// entry was applied, so replaying entries in order reconstructs the
/// balance trajectory exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Tenant this entry belongs to
    pub tenant_id: TenantId,

    /// Signed amount; negative = consumption
    pub amount: i64,

    /// Balance snapshot after applying this entry
    pub balance_after: i64,

    /// Transaction kind
    pub kind: EntryKind,

    /// Action key that triggered a consumption (e.g. "export_csv")
    pub action_key: Option<String>,

    /// Free-text description
    pub description: Option<String>,

    /// Caller-supplied stable reference (order id, repair op, ...);
    /// not required to be a UUID
    pub reference_id: Option<String>,

    /// Arbitrary metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Entry timestamp
    pub created_at: DateTime<Utc>,
}

/// Append-only audit row, one per rate-limited action that was allowed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// Unique row ID
    pub log_id: Uuid,

    /// Tenant that performed the action
    pub tenant_id: TenantId,

    /// Action type being rate-limited
    pub action_type: String,

    /// When the action was allowed
    pub created_at: DateTime<Utc>,
}

/// Tenant organization record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant ID
    pub tenant_id: TenantId,

    /// Display name
    pub name: String,

    /// Plan the tenant signed up on
    pub plan: String,

    /// Soft-delete flag
    pub suspended: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Membership linking a user to a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    /// Membership ID
    pub membership_id: Uuid,

    /// Tenant
    pub tenant_id: TenantId,

    /// Member email
    pub email: String,

    /// Role within the tenant
    pub role: MemberRole,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Role of a tenant member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRole {
    /// Owning account
    Owner,
    /// Invited staff
    Staff,
}

/// Subscription audit event written at provisioning and plan changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    /// Event ID (UUIDv7)
    pub event_id: Uuid,

    /// Tenant
    pub tenant_id: TenantId,

    /// Plan name at the time of the event
    pub plan: String,

    /// What happened ("provisioned", "upgraded", ...)
    pub event: String,

    /// Event timestamp
    pub created_at: DateTime<Utc>,
}

/// Result of a read-only balance probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceCheck {
    /// Whether a consume for this action would currently succeed
    pub allowed: bool,

    /// Current balance (may be the unlimited sentinel)
    pub balance: i64,

    /// Cost the action would consume
    pub required: i64,
}

/// Outcome of a consume call
///
/// Insufficient funds is a reported, non-fatal outcome; callers branch on
/// the variant rather than catching an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Credits were consumed
    Consumed {
        /// Amount actually decremented (0 for unlimited tenants)
        consumed: i64,
        /// Balance after the consumption
        new_balance: i64,
    },

    /// Balance was lower than the required cost; nothing was mutated
    InsufficientFunds {
        /// Current balance
        balance: i64,
        /// Cost that was required
        required: i64,
    },

    /// A consumption with this reference id was already applied; nothing
    /// was mutated (idempotent retry)
    Duplicate {
        /// Current balance
        new_balance: i64,
    },
}

impl ConsumeOutcome {
    /// Whether the action is paid for (first application or idempotent replay)
    pub fn is_success(&self) -> bool {
        !matches!(self, ConsumeOutcome::InsufficientFunds { .. })
    }
}

/// Decision returned by the rate limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateDecision {
    /// Whether the action was allowed (and logged)
    pub allowed: bool,

    /// Actions already used within the window (including this one if allowed)
    pub used: u32,

    /// Actions remaining within the window
    pub remaining: u32,

    /// When the window frees up a slot again
    pub reset_at: DateTime<Utc>,
}
