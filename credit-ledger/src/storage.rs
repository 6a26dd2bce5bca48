//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - Balance projection per tenant (key: tenant_id)
//! - `entries` - Append-only ledger entries (key: entry_id)
//! - `action_log` - Append-only rate-limit audit rows (key: tenant || action hash || timestamp || log_id)
//! - `tenants` - Tenant, membership and subscription-event rows
//! - `indices` - Secondary indices (ledger history, reference-id uniqueness)

use crate::{
    error::{Error, Result},
    types::{
        ActionLogEntry, LedgerEntry, Membership, SubscriptionEvent, Tenant, TenantBalance,
        TenantId,
    },
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_ENTRIES: &str = "entries";
const CF_ACTION_LOG: &str = "action_log";
const CF_TENANTS: &str = "tenants";
const CF_INDICES: &str = "indices";

/// Key-space tags within `tenants` (tenant rows share a CF with their
/// membership and subscription-event children)
const TENANT_TAG_ROW: u8 = 1;
const TENANT_TAG_MEMBER: u8 = 2;
const TENANT_TAG_SUBSCRIPTION: u8 = 3;

/// Reference-index classes: grants and consumptions have independent
/// reference-id uniqueness
const REF_CLASS_GRANT: u8 = b'g';
const REF_CLASS_CONSUMPTION: u8 = b'c';

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_balances()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_entries()),
            ColumnFamilyDescriptor::new(CF_ACTION_LOG, Self::cf_options_action_log()),
            ColumnFamilyDescriptor::new(CF_TENANTS, Self::cf_options_tenants()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened credit ledger storage");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_balances() -> Options {
        let mut opts = Options::default();
        // Hot read path, favor speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_entries() -> Options {
        let mut opts = Options::default();
        // Append-only history, favor space
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_action_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_tenants() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Balance operations

    /// Put balance projection (insert or overwrite)
    pub fn put_balance(&self, balance: &TenantBalance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = bincode::serialize(balance)?;
        self.db.put_cf(cf, balance.tenant_id.as_bytes(), &value)?;
        Ok(())
    }

    /// Get balance projection. A missing row is a provisioning bug and is
    /// reported as NotProvisioned, never treated as a zero balance.
    pub fn get_balance(&self, tenant_id: TenantId) -> Result<TenantBalance> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = self
            .db
            .get_cf(cf, tenant_id.as_bytes())?
            .ok_or_else(|| Error::NotProvisioned(tenant_id.to_string()))?;
        let balance: TenantBalance = bincode::deserialize(&value)?;
        Ok(balance)
    }

    /// Whether a balance row exists for this tenant
    pub fn balance_exists(&self, tenant_id: TenantId) -> Result<bool> {
        let cf = self.cf_handle(CF_BALANCES)?;
        Ok(self.db.get_cf(cf, tenant_id.as_bytes())?.is_some())
    }

    // Ledger entry operations

    /// Append a ledger entry together with its updated balance projection
    /// and indices, as one atomic WriteBatch
    pub fn append_entry_atomic(&self, balance: &TenantBalance, entry: &LedgerEntry) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Entry
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        batch.put_cf(cf_entries, entry.entry_id.as_bytes(), bincode::serialize(entry)?);

        // 2. Balance projection
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        batch.put_cf(
            cf_balances,
            balance.tenant_id.as_bytes(),
            bincode::serialize(balance)?,
        );

        // 3. Indices
        let cf_indices = self.cf_handle(CF_INDICES)?;

        // Index: tenant || entry_id -> empty (UUIDv7 keys keep time order)
        let idx_history = Self::index_key_history(entry.tenant_id, Some(entry.entry_id));
        batch.put_cf(cf_indices, &idx_history, []);

        // Index: class || tenant || reference_id -> entry_id
        if let Some(ref reference) = entry.reference_id {
            let idx_ref = Self::index_key_reference(entry.tenant_id, entry.kind.is_grant(), reference);
            batch.put_cf(cf_indices, &idx_ref, entry.entry_id.as_bytes());
        }

        self.db.write(batch)?;

        tracing::debug!(
            entry_id = %entry.entry_id,
            tenant_id = %entry.tenant_id,
            amount = entry.amount,
            balance_after = entry.balance_after,
            "Ledger entry appended"
        );

        Ok(())
    }

    /// Get entry by ID
    pub fn get_entry(&self, entry_id: Uuid) -> Result<LedgerEntry> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let value = self
            .db
            .get_cf(cf, entry_id.as_bytes())?
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        let entry: LedgerEntry = bincode::deserialize(&value)?;
        Ok(entry)
    }

    /// Find an entry by (tenant, reference class, reference id)
    pub fn find_entry_by_reference(
        &self,
        tenant_id: TenantId,
        grant_class: bool,
        reference_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::index_key_reference(tenant_id, grant_class, reference_id);

        match self.db.get_cf(cf, &key)? {
            Some(value) if value.len() == 16 => {
                let entry_id_bytes: [u8; 16] = value[..16].try_into().unwrap();
                Ok(Some(self.get_entry(Uuid::from_bytes(entry_id_bytes))?))
            }
            Some(_) => Err(Error::Storage("Corrupt reference index value".to_string())),
            None => Ok(None),
        }
    }

    /// All entries for a tenant in chronological order (via history index)
    pub fn tenant_entries(&self, tenant_id: TenantId) -> Result<Vec<LedgerEntry>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_key_history(tenant_id, None);
        let iter = self.db.prefix_iterator_cf(cf_indices, &prefix);

        let mut entries = Vec::new();
        for item in iter {
            let (key, _) = item?;

            // prefix_iterator seeks, it does not bound: stop at the prefix edge
            if !key.starts_with(&prefix) {
                break;
            }

            if key.len() >= 33 {
                let entry_id_bytes: [u8; 16] = key[17..33].try_into().unwrap();
                entries.push(self.get_entry(Uuid::from_bytes(entry_id_bytes))?);
            }
        }

        Ok(entries)
    }

    // Action log operations

    /// Append one allowed-action audit row
    pub fn append_action(&self, action: &ActionLogEntry) -> Result<()> {
        let cf = self.cf_handle(CF_ACTION_LOG)?;
        let key = Self::action_key(
            action.tenant_id,
            &action.action_type,
            action.created_at,
            action.log_id,
        );
        self.db.put_cf(cf, &key, bincode::serialize(action)?)?;
        Ok(())
    }

    /// Count allowed actions for (tenant, action_type) at or after `cutoff`,
    /// returning the count and the oldest in-window timestamp
    pub fn actions_in_window(
        &self,
        tenant_id: TenantId,
        action_type: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<(u32, Option<DateTime<Utc>>)> {
        let cf = self.cf_handle(CF_ACTION_LOG)?;

        let prefix = Self::action_prefix(tenant_id, action_type);
        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut used = 0u32;
        let mut oldest: Option<DateTime<Utc>> = None;

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let action: ActionLogEntry = bincode::deserialize(&value)?;
            if action.created_at >= cutoff {
                used += 1;
                if oldest.map(|o| action.created_at < o).unwrap_or(true) {
                    oldest = Some(action.created_at);
                }
            }
        }

        Ok((used, oldest))
    }

    // Tenant operations

    /// Write tenant, owner membership and subscription event as one batch
    pub fn put_tenant_atomic(
        &self,
        tenant: &Tenant,
        membership: &Membership,
        event: &SubscriptionEvent,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        let cf = self.cf_handle(CF_TENANTS)?;

        batch.put_cf(
            cf,
            Self::tenant_key(TENANT_TAG_ROW, tenant.tenant_id, &[]),
            bincode::serialize(tenant)?,
        );
        batch.put_cf(
            cf,
            Self::tenant_key(
                TENANT_TAG_MEMBER,
                membership.tenant_id,
                membership.membership_id.as_bytes(),
            ),
            bincode::serialize(membership)?,
        );
        batch.put_cf(
            cf,
            Self::tenant_key(
                TENANT_TAG_SUBSCRIPTION,
                event.tenant_id,
                event.event_id.as_bytes(),
            ),
            bincode::serialize(event)?,
        );

        self.db.write(batch)?;

        tracing::info!(tenant_id = %tenant.tenant_id, plan = %tenant.plan, "Tenant rows written");

        Ok(())
    }

    /// Get tenant row
    pub fn get_tenant(&self, tenant_id: TenantId) -> Result<Tenant> {
        let cf = self.cf_handle(CF_TENANTS)?;
        let key = Self::tenant_key(TENANT_TAG_ROW, tenant_id, &[]);
        let value = self
            .db
            .get_cf(cf, &key)?
            .ok_or_else(|| Error::TenantNotFound(tenant_id.to_string()))?;
        let tenant: Tenant = bincode::deserialize(&value)?;
        Ok(tenant)
    }

    /// Memberships of a tenant
    pub fn tenant_memberships(&self, tenant_id: TenantId) -> Result<Vec<Membership>> {
        let cf = self.cf_handle(CF_TENANTS)?;
        let prefix = Self::tenant_key(TENANT_TAG_MEMBER, tenant_id, &[]);
        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut members = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            members.push(bincode::deserialize(&value)?);
        }

        Ok(members)
    }

    // Index key helpers

    fn tenant_key(tag: u8, tenant_id: TenantId, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(17 + suffix.len());
        key.push(tag);
        key.extend_from_slice(tenant_id.as_bytes());
        key.extend_from_slice(suffix);
        key
    }

    fn index_key_history(tenant_id: TenantId, entry_id: Option<Uuid>) -> Vec<u8> {
        let mut key = Vec::with_capacity(33);
        key.push(b'h');
        key.extend_from_slice(tenant_id.as_bytes());
        if let Some(eid) = entry_id {
            key.extend_from_slice(eid.as_bytes());
        }
        key
    }

    fn index_key_reference(tenant_id: TenantId, grant_class: bool, reference_id: &str) -> Vec<u8> {
        let class = if grant_class {
            REF_CLASS_GRANT
        } else {
            REF_CLASS_CONSUMPTION
        };
        let mut key = Vec::with_capacity(17 + reference_id.len());
        key.push(class);
        key.extend_from_slice(tenant_id.as_bytes());
        key.extend_from_slice(reference_id.as_bytes());
        key
    }

    fn action_prefix(tenant_id: TenantId, action_type: &str) -> Vec<u8> {
        let mut hasher = DefaultHasher::new();
        action_type.hash(&mut hasher);

        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(tenant_id.as_bytes());
        key.extend_from_slice(&hasher.finish().to_be_bytes());
        key
    }

    fn action_key(
        tenant_id: TenantId,
        action_type: &str,
        created_at: DateTime<Utc>,
        log_id: Uuid,
    ) -> Vec<u8> {
        let mut key = Self::action_prefix(tenant_id, action_type);
        let nanos = created_at.timestamp_nanos_opt().unwrap_or(0);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(log_id.as_bytes());
        key
    }

    // Statistics

    /// Total entries written (approximate, fast)
    pub fn approximate_entry_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }

    /// Exact balance row count (slow scan, used by admin tooling)
    pub fn balance_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryKind, MemberRole, PlanStatus};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_entry(tenant_id: TenantId, amount: i64, balance_after: i64) -> LedgerEntry {
        LedgerEntry {
            entry_id: Uuid::now_v7(),
            tenant_id,
            amount,
            balance_after,
            kind: if amount >= 0 {
                EntryKind::Grant
            } else {
                EntryKind::Consumption
            },
            action_key: None,
            description: None,
            reference_id: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_balance_is_not_provisioned() {
        let (storage, _temp) = test_storage();
        let result = storage.get_balance(TenantId::new());
        assert!(matches!(result, Err(Error::NotProvisioned(_))));
    }

    #[test]
    fn test_balance_roundtrip() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();

        let mut balance = TenantBalance::new(tenant_id, PlanStatus::Free);
        balance.balance = 10_000;
        balance.free_balance = 10_000;

        storage.put_balance(&balance).unwrap();

        let retrieved = storage.get_balance(tenant_id).unwrap();
        assert_eq!(retrieved.balance, 10_000);
        assert_eq!(retrieved.free_balance, 10_000);
        assert!(storage.balance_exists(tenant_id).unwrap());
    }

    #[test]
    fn test_atomic_append_and_history_order() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();

        let mut balance = TenantBalance::new(tenant_id, PlanStatus::Free);
        let mut running = 0i64;
        for amount in [100i64, -30, -20, 50] {
            running += amount;
            balance.balance = running;
            balance.free_balance = running;
            let entry = test_entry(tenant_id, amount, running);
            storage.append_entry_atomic(&balance, &entry).unwrap();
        }

        let entries = storage.tenant_entries(tenant_id).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries.iter().map(|e| e.amount).collect::<Vec<_>>(),
            vec![100, -30, -20, 50]
        );
        assert_eq!(entries.last().unwrap().balance_after, 100);
    }

    #[test]
    fn test_history_isolated_per_tenant() {
        let (storage, _temp) = test_storage();
        let a = TenantId::new();
        let b = TenantId::new();

        for tenant in [a, b] {
            let mut balance = TenantBalance::new(tenant, PlanStatus::Free);
            balance.balance = 10;
            balance.free_balance = 10;
            storage
                .append_entry_atomic(&balance, &test_entry(tenant, 10, 10))
                .unwrap();
        }

        assert_eq!(storage.tenant_entries(a).unwrap().len(), 1);
        assert_eq!(storage.tenant_entries(b).unwrap().len(), 1);
    }

    #[test]
    fn test_reference_index_classes() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();

        let mut balance = TenantBalance::new(tenant_id, PlanStatus::Free);
        balance.balance = 100;
        balance.free_balance = 100;

        let mut grant = test_entry(tenant_id, 100, 100);
        grant.reference_id = Some("order-42".to_string());
        storage.append_entry_atomic(&balance, &grant).unwrap();

        // Same reference string, consumption class: independent slot
        assert!(storage
            .find_entry_by_reference(tenant_id, true, "order-42")
            .unwrap()
            .is_some());
        assert!(storage
            .find_entry_by_reference(tenant_id, false, "order-42")
            .unwrap()
            .is_none());
        assert!(storage
            .find_entry_by_reference(tenant_id, true, "order-43")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_action_window_counting() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();
        let now = Utc::now();

        for age_hours in [30i64, 10, 5, 1] {
            let action = ActionLogEntry {
                log_id: Uuid::now_v7(),
                tenant_id,
                action_type: "bulk_import".to_string(),
                created_at: now - chrono::Duration::hours(age_hours),
            };
            storage.append_action(&action).unwrap();
        }

        let cutoff = now - chrono::Duration::hours(24);
        let (used, oldest) = storage
            .actions_in_window(tenant_id, "bulk_import", cutoff)
            .unwrap();
        assert_eq!(used, 3); // the 30h-old row is outside the window
        assert_eq!(oldest.unwrap(), now - chrono::Duration::hours(10));

        // Different action type shares nothing
        let (used, _) = storage
            .actions_in_window(tenant_id, "export_csv", cutoff)
            .unwrap();
        assert_eq!(used, 0);
    }

    #[test]
    fn test_tenant_rows_atomic() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();

        let tenant = Tenant {
            tenant_id,
            name: "Corner Store".to_string(),
            plan: "starter".to_string(),
            suspended: false,
            created_at: Utc::now(),
        };
        let membership = Membership {
            membership_id: Uuid::new_v4(),
            tenant_id,
            email: "owner@corner.example".to_string(),
            role: MemberRole::Owner,
            created_at: Utc::now(),
        };
        let event = SubscriptionEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            plan: "starter".to_string(),
            event: "provisioned".to_string(),
            created_at: Utc::now(),
        };

        storage.put_tenant_atomic(&tenant, &membership, &event).unwrap();

        let retrieved = storage.get_tenant(tenant_id).unwrap();
        assert_eq!(retrieved.name, "Corner Store");

        let members = storage.tenant_memberships(tenant_id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, MemberRole::Owner);
    }
}
