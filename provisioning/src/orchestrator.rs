//! Idempotent tenant provisioning
//!
//! Provisioning must survive webhook retries and partial failures without
//! ever stacking a second signup allocation. Three properties carry that:
//!
//! - The tenant ID is a UUIDv5 of the normalized owner email, so a retry
//!   lands on the same tenant rather than creating a sibling
//! - The balance row is only seeded when absent; re-provisioning a tenant
//!   who has already spent credits never resets their balance
//! - The signup bonus is a ledger grant with a deterministic reference
//!   (`signup:<tenant>`), deduplicated by the grant reference index

use crate::{
    error::{Error, Result},
    plan::PlanTier,
};
use chrono::{Duration, Utc};
use credit_ledger::{
    CreditAccounting, EntryKind, MemberRole, Membership, SubscriptionEvent, Tenant, TenantBalance,
    TenantId, UNLIMITED_BALANCE,
};
use std::sync::Arc;
use uuid::Uuid;

/// DNS name the tenant ID namespace is derived from
const TENANT_NAMESPACE_DNS: &[u8] = b"tenants.meridian-commerce.dev";

/// A provisioning request, typically from a signup or billing webhook
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Business display name
    pub business_name: String,

    /// Owner email; normalized before deriving the tenant ID
    pub owner_email: String,

    /// Plan signed up on
    pub tier: PlanTier,
}

/// What a provisioning call produced
#[derive(Debug, Clone)]
pub struct ProvisionReceipt {
    /// Tenant (deterministic for a given owner email)
    pub tenant_id: TenantId,

    /// Plan provisioned
    pub tier: PlanTier,

    /// Credits granted by this call (0 on replays and for trials)
    pub granted: i64,

    /// Balance after provisioning
    pub balance: i64,

    /// False when the tenant already existed
    pub newly_provisioned: bool,
}

/// Provisioning orchestrator over the credit ledger
pub struct Provisioner {
    accounting: Arc<CreditAccounting>,
}

impl Provisioner {
    /// Build an orchestrator over an accounting service
    pub fn new(accounting: Arc<CreditAccounting>) -> Self {
        Self { accounting }
    }

    /// Deterministic tenant ID for an owner email
    pub fn tenant_id_for(owner_email: &str) -> TenantId {
        let namespace = Uuid::new_v5(&Uuid::NAMESPACE_DNS, TENANT_NAMESPACE_DNS);
        let normalized = owner_email.trim().to_lowercase();
        TenantId::from_uuid(Uuid::new_v5(&namespace, normalized.as_bytes()))
    }

    /// Provision a tenant: balance row, signup allocation, tenant rows.
    /// Safe to call any number of times with the same request.
    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionReceipt> {
        let email = request.owner_email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::InvalidEmail(request.owner_email.clone()));
        }

        let tenant_id = Self::tenant_id_for(&email);
        let storage = self.accounting.storage();

        // Seed under the tenant's row lock: of two racing attempts only one
        // writes, and a late seed can never reset an already granted balance
        let mut seed = TenantBalance::new(tenant_id, request.tier.status());
        if request.tier.signup_credits() == UNLIMITED_BALANCE {
            seed.balance = UNLIMITED_BALANCE;
        }
        if let Some(days) = request.tier.expiry_days() {
            seed.free_expires_at = Some(Utc::now() + Duration::days(days));
        }
        let newly_provisioned = self.accounting.seed_balance_if_absent(seed).await?;

        // Signup allocation via the ledger. Always attempted, even on
        // replays: the deterministic reference deduplicates, and a retry
        // after a crash between balance seeding and grant still heals.
        // Trials carry the sentinel, nothing to grant.
        let credits = request.tier.signup_credits();
        let granted = if credits != UNLIMITED_BALANCE {
            let before = storage.get_balance(tenant_id)?.balance;
            let after = self
                .accounting
                .grant(
                    tenant_id,
                    credits,
                    EntryKind::SignupBonus,
                    format!("Signup bonus ({} plan)", request.tier),
                    format!("signup:{}", tenant_id),
                )
                .await?;
            after - before
        } else {
            0
        };

        // Tenant, owner membership and subscription event; re-checked
        // separately so a crash between balance and tenant rows heals on
        // the next attempt
        match storage.get_tenant(tenant_id) {
            Ok(_) => {}
            Err(credit_ledger::Error::TenantNotFound(_)) => {
                let now = Utc::now();
                let tenant = Tenant {
                    tenant_id,
                    name: request.business_name.clone(),
                    plan: request.tier.as_str().to_string(),
                    suspended: false,
                    created_at: now,
                };
                let membership = Membership {
                    membership_id: Uuid::new_v5(&tenant_id.as_uuid(), b"owner"),
                    tenant_id,
                    email: email.clone(),
                    role: MemberRole::Owner,
                    created_at: now,
                };
                let event = SubscriptionEvent {
                    event_id: Uuid::now_v7(),
                    tenant_id,
                    plan: request.tier.as_str().to_string(),
                    event: "provisioned".to_string(),
                    created_at: now,
                };
                storage.put_tenant_atomic(&tenant, &membership, &event)?;
            }
            Err(e) => return Err(e.into()),
        }

        let balance = storage.get_balance(tenant_id)?.balance;

        tracing::info!(
            tenant_id = %tenant_id,
            tier = %request.tier,
            granted,
            balance,
            newly_provisioned,
            "Tenant provisioned"
        );

        Ok(ProvisionReceipt {
            tenant_id,
            tier: request.tier,
            granted,
            balance,
            newly_provisioned,
        })
    }
}
