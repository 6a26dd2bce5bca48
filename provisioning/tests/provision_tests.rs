//! Integration tests: provisioning end to end against a real ledger

use credit_ledger::{Config, ConsumeOutcome, ConsumeRequest, CreditAccounting, PlanStatus};
use provisioning::{PlanTier, ProvisionRequest, Provisioner};
use std::sync::Arc;
use tempfile::TempDir;

fn test_provisioner() -> (Provisioner, Arc<CreditAccounting>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config
        .costs
        .action_costs
        .insert("export_csv".to_string(), 50);

    let accounting = Arc::new(CreditAccounting::open(config).unwrap());
    (Provisioner::new(accounting.clone()), accounting, temp_dir)
}

fn request(tier: PlanTier) -> ProvisionRequest {
    ProvisionRequest {
        business_name: "Corner Store".to_string(),
        owner_email: "owner@corner.example".to_string(),
        tier,
    }
}

#[tokio::test]
async fn test_free_plan_seeds_ten_thousand_credits() {
    let (provisioner, accounting, _temp) = test_provisioner();

    let receipt = provisioner.provision(&request(PlanTier::Free)).await.unwrap();

    assert!(receipt.newly_provisioned);
    assert_eq!(receipt.granted, 10_000);
    assert_eq!(receipt.balance, 10_000);

    let balance = accounting.storage().get_balance(receipt.tenant_id).unwrap();
    assert_eq!(balance.free_balance, 10_000);
    assert_eq!(balance.purchased_balance, 0);
    assert_eq!(balance.tier, PlanStatus::Free);

    // The allocation is a real ledger entry, not just a projection write
    let entries = accounting.storage().tenant_entries(receipt.tenant_id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 10_000);
}

#[tokio::test]
async fn test_replayed_provisioning_does_not_stack() {
    let (provisioner, accounting, _temp) = test_provisioner();

    let first = provisioner.provision(&request(PlanTier::Starter)).await.unwrap();
    let second = provisioner.provision(&request(PlanTier::Starter)).await.unwrap();

    assert_eq!(first.tenant_id, second.tenant_id);
    assert!(first.newly_provisioned);
    assert!(!second.newly_provisioned);
    assert_eq!(first.granted, 25_000);
    assert_eq!(second.granted, 0);
    assert_eq!(second.balance, 25_000);

    let entries = accounting.storage().tenant_entries(first.tenant_id).unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_replay_preserves_spent_balance() {
    let (provisioner, accounting, _temp) = test_provisioner();

    let receipt = provisioner.provision(&request(PlanTier::Free)).await.unwrap();

    let outcome = accounting
        .consume(receipt.tenant_id, "export_csv", ConsumeRequest::default())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ConsumeOutcome::Consumed {
            consumed: 50,
            new_balance: 9_950
        }
    );

    // A billing webhook fires again: the tenant keeps their spent balance
    let replay = provisioner.provision(&request(PlanTier::Free)).await.unwrap();
    assert_eq!(replay.balance, 9_950);
    assert_eq!(replay.granted, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_provisioning_keeps_the_allocation() {
    let (provisioner, accounting, _temp) = test_provisioner();
    let provisioner = Arc::new(provisioner);

    // A signup and its webhook replays land at once; the late seeds must
    // not reset the balance the winner's grant already produced
    let mut handles = Vec::new();
    for _ in 0..8 {
        let provisioner = provisioner.clone();
        handles.push(tokio::spawn(async move {
            provisioner.provision(&request(PlanTier::Starter)).await
        }));
    }

    let mut receipts = Vec::new();
    for handle in handles {
        receipts.push(handle.await.unwrap().unwrap());
    }

    let tenant_id = receipts[0].tenant_id;
    assert!(receipts.iter().all(|r| r.tenant_id == tenant_id));
    assert_eq!(receipts.iter().filter(|r| r.newly_provisioned).count(), 1);

    // One signup entry, and projection agrees with ledger replay
    let entries = accounting.storage().tenant_entries(tenant_id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].balance_after, 25_000);

    let balance = accounting.storage().get_balance(tenant_id).unwrap();
    assert_eq!(balance.balance, 25_000);
    assert_eq!(accounting.replay_balance(tenant_id).unwrap(), 25_000);
}

#[tokio::test]
async fn test_trial_is_unlimited_with_expiry() {
    let (provisioner, accounting, _temp) = test_provisioner();

    let receipt = provisioner.provision(&request(PlanTier::Trial)).await.unwrap();
    assert_eq!(receipt.granted, 0);

    let balance = accounting.storage().get_balance(receipt.tenant_id).unwrap();
    assert!(balance.is_unlimited());
    assert!(balance.free_expires_at.is_some());

    // Unlimited tenants consume without decrement
    let outcome = accounting
        .consume(receipt.tenant_id, "export_csv", ConsumeRequest::default())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ConsumeOutcome::Consumed {
            consumed: 0,
            new_balance: credit_ledger::UNLIMITED_BALANCE
        }
    );
}

#[tokio::test]
async fn test_tenant_rows_written_once() {
    let (provisioner, accounting, _temp) = test_provisioner();

    let receipt = provisioner
        .provision(&request(PlanTier::Professional))
        .await
        .unwrap();
    provisioner
        .provision(&request(PlanTier::Professional))
        .await
        .unwrap();

    let tenant = accounting.storage().get_tenant(receipt.tenant_id).unwrap();
    assert_eq!(tenant.name, "Corner Store");
    assert_eq!(tenant.plan, "professional");

    let members = accounting
        .storage()
        .tenant_memberships(receipt.tenant_id)
        .unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].email, "owner@corner.example");
}

#[tokio::test]
async fn test_invalid_email_rejected() {
    let (provisioner, _accounting, _temp) = test_provisioner();

    let mut bad = request(PlanTier::Free);
    bad.owner_email = "not-an-email".to_string();

    let result = provisioner.provision(&bad).await;
    assert!(matches!(result, Err(provisioning::Error::InvalidEmail(_))));
}

#[tokio::test]
async fn test_different_owners_get_different_tenants() {
    let (provisioner, _accounting, _temp) = test_provisioner();

    let a = provisioner.provision(&request(PlanTier::Free)).await.unwrap();

    let mut other = request(PlanTier::Free);
    other.owner_email = "someone-else@corner.example".to_string();
    let b = provisioner.provision(&other).await.unwrap();

    assert_ne!(a.tenant_id, b.tenant_id);
    assert!(b.newly_provisioned);
}
