//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `inventory` - Stock positions (key: tenant_id || product_id)
//! - `sales` - Completed sale transactions (key: sale_id)
//! - `movements` - Append-only stock movement audit rows (key: tenant || product || movement_id)
//! - `orders` - Unified cross-channel order mirrors (key: tenant || order_id)
//! - `sessions` - Shift/session accumulators (key: tenant || session_id)
//! - `customers` - Loyalty accumulators (key: tenant || customer_id)
//! - `fees` - Platform fees, keyed by sale_id so one sale can never fee twice
//! - `indices` - Secondary indices (transaction-number uniqueness, per-tenant sale history)

use crate::{
    error::{Error, Result},
    types::{
        CustomerLoyalty, FeeTransaction, InventoryItem, ProductId, SaleTransaction, ShiftSession,
        StockMovement, UnifiedOrder,
    },
    Config,
};
use credit_ledger::TenantId;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_INVENTORY: &str = "inventory";
const CF_SALES: &str = "sales";
const CF_MOVEMENTS: &str = "movements";
const CF_ORDERS: &str = "orders";
const CF_SESSIONS: &str = "sessions";
const CF_CUSTOMERS: &str = "customers";
const CF_FEES: &str = "fees";
const CF_INDICES: &str = "indices";

/// Index tags within `indices`
const IDX_TXN_NUMBER: u8 = b'n';
const IDX_SALE_HISTORY: u8 = b's';

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
            ColumnFamilyDescriptor::new(CF_INVENTORY, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_SALES, Self::cf_options_archive()),
            ColumnFamilyDescriptor::new(CF_MOVEMENTS, Self::cf_options_archive()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Self::cf_options_archive()),
            ColumnFamilyDescriptor::new(CF_SESSIONS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_CUSTOMERS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_FEES, Self::cf_options_archive()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened sale engine storage");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Hot read path, favor speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_archive() -> Options {
        let mut opts = Options::default();
        // Write-once history, favor space
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
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

    // Inventory operations

    /// Row key for an inventory item
    pub fn item_key(tenant_id: TenantId, product_id: ProductId) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(tenant_id.as_bytes());
        key.extend_from_slice(product_id.as_bytes());
        key
    }

    /// Insert or overwrite a stock position
    pub fn put_item(&self, item: &InventoryItem) -> Result<()> {
        let cf = self.cf_handle(CF_INVENTORY)?;
        let key = Self::item_key(item.tenant_id, item.product_id);
        self.db.put_cf(cf, &key, bincode::serialize(item)?)?;
        Ok(())
    }

    /// Get a stock position, if the product exists for this tenant
    pub fn get_item(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<InventoryItem>> {
        let cf = self.cf_handle(CF_INVENTORY)?;
        let key = Self::item_key(tenant_id, product_id);
        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// All stock positions for a tenant
    pub fn tenant_items(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>> {
        let cf = self.cf_handle(CF_INVENTORY)?;
        let prefix = tenant_id.as_bytes().to_vec();
        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut items = Vec::new();
        for item in iter {
            let (key, value) = item?;

            // prefix_iterator seeks, it does not bound: stop at the prefix edge
            if !key.starts_with(&prefix) {
                break;
            }
            items.push(bincode::deserialize(&value)?);
        }

        Ok(items)
    }

    // Sale operations

    /// Commit a sale and every row it touches as one atomic WriteBatch:
    /// the sale record, each decremented stock position, the movement audit
    /// rows, the session and loyalty accumulators, the unified order mirror
    /// and the uniqueness/history indices all land together or not at all.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_sale_atomic(
        &self,
        sale: &SaleTransaction,
        items: &[InventoryItem],
        movements: &[StockMovement],
        session: Option<&ShiftSession>,
        loyalty: Option<&CustomerLoyalty>,
        order: &UnifiedOrder,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Sale record
        let cf_sales = self.cf_handle(CF_SALES)?;
        batch.put_cf(cf_sales, sale.sale_id.as_bytes(), bincode::serialize(sale)?);

        // 2. Stock positions
        let cf_inventory = self.cf_handle(CF_INVENTORY)?;
        for item in items {
            let key = Self::item_key(item.tenant_id, item.product_id);
            batch.put_cf(cf_inventory, &key, bincode::serialize(item)?);
        }

        // 3. Movement audit rows
        let cf_movements = self.cf_handle(CF_MOVEMENTS)?;
        for movement in movements {
            let key = Self::movement_key(movement);
            batch.put_cf(cf_movements, &key, bincode::serialize(movement)?);
        }

        // 4. Session accumulator
        if let Some(session) = session {
            let cf_sessions = self.cf_handle(CF_SESSIONS)?;
            let key = Self::child_key(session.tenant_id, session.session_id);
            batch.put_cf(cf_sessions, &key, bincode::serialize(session)?);
        }

        // 5. Loyalty accumulator
        if let Some(loyalty) = loyalty {
            let cf_customers = self.cf_handle(CF_CUSTOMERS)?;
            let key = Self::child_key(loyalty.tenant_id, loyalty.customer_id);
            batch.put_cf(cf_customers, &key, bincode::serialize(loyalty)?);
        }

        // 6. Unified order mirror
        let cf_orders = self.cf_handle(CF_ORDERS)?;
        batch.put_cf(
            cf_orders,
            Self::child_key(order.tenant_id, order.order_id),
            bincode::serialize(order)?,
        );

        // 7. Indices: transaction number -> sale_id, per-tenant sale history
        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_txn_number(sale.tenant_id, &sale.transaction_number),
            sale.sale_id.as_bytes(),
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_sale_history(sale.tenant_id, Some(sale.sale_id)),
            [],
        );

        self.db.write(batch)?;

        tracing::debug!(
            sale_id = %sale.sale_id,
            tenant_id = %sale.tenant_id,
            transaction_number = %sale.transaction_number,
            total = %sale.total,
            lines = sale.lines.len(),
            "Sale committed"
        );

        Ok(())
    }

    /// Write one stock position together with its movement audit row
    /// (restock and manual adjustment path)
    pub fn commit_movement_atomic(
        &self,
        item: &InventoryItem,
        movement: &StockMovement,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_inventory = self.cf_handle(CF_INVENTORY)?;
        let key = Self::item_key(item.tenant_id, item.product_id);
        batch.put_cf(cf_inventory, &key, bincode::serialize(item)?);

        let cf_movements = self.cf_handle(CF_MOVEMENTS)?;
        batch.put_cf(
            cf_movements,
            Self::movement_key(movement),
            bincode::serialize(movement)?,
        );

        self.db.write(batch)?;
        Ok(())
    }

    /// Get a sale by ID
    pub fn get_sale(&self, sale_id: Uuid) -> Result<SaleTransaction> {
        let cf = self.cf_handle(CF_SALES)?;
        let value = self
            .db
            .get_cf(cf, sale_id.as_bytes())?
            .ok_or(Error::SaleNotFound(sale_id))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Whether this transaction number is already taken for the tenant
    pub fn txn_number_exists(&self, tenant_id: TenantId, number: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::index_key_txn_number(tenant_id, number);
        Ok(self.db.get_cf(cf, &key)?.is_some())
    }

    /// Look up a sale by its transaction number
    pub fn find_sale_by_number(
        &self,
        tenant_id: TenantId,
        number: &str,
    ) -> Result<Option<SaleTransaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::index_key_txn_number(tenant_id, number);

        match self.db.get_cf(cf, &key)? {
            Some(value) if value.len() == 16 => {
                let sale_id_bytes: [u8; 16] = value[..16].try_into().unwrap();
                Ok(Some(self.get_sale(Uuid::from_bytes(sale_id_bytes))?))
            }
            Some(_) => Err(Error::Storage("Corrupt transaction number index".to_string())),
            None => Ok(None),
        }
    }

    /// All sales for a tenant in chronological order (UUIDv7 history keys)
    pub fn tenant_sales(&self, tenant_id: TenantId) -> Result<Vec<SaleTransaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key_sale_history(tenant_id, None);
        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut sales = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() >= 33 {
                let sale_id_bytes: [u8; 16] = key[17..33].try_into().unwrap();
                sales.push(self.get_sale(Uuid::from_bytes(sale_id_bytes))?);
            }
        }

        Ok(sales)
    }

    /// Movement history for one product, oldest first
    pub fn product_movements(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Vec<StockMovement>> {
        let cf = self.cf_handle(CF_MOVEMENTS)?;
        let prefix = Self::item_key(tenant_id, product_id);
        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut movements = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            movements.push(bincode::deserialize(&value)?);
        }

        Ok(movements)
    }

    // Session and loyalty operations

    /// Get a shift session, if one exists
    pub fn get_session(&self, tenant_id: TenantId, session_id: Uuid) -> Result<Option<ShiftSession>> {
        let cf = self.cf_handle(CF_SESSIONS)?;
        let key = Self::child_key(tenant_id, session_id);
        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get a loyalty accumulator, if one exists
    pub fn get_loyalty(
        &self,
        tenant_id: TenantId,
        customer_id: Uuid,
    ) -> Result<Option<CustomerLoyalty>> {
        let cf = self.cf_handle(CF_CUSTOMERS)?;
        let key = Self::child_key(tenant_id, customer_id);
        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get a unified order, if one exists
    pub fn get_order(&self, tenant_id: TenantId, order_id: Uuid) -> Result<Option<UnifiedOrder>> {
        let cf = self.cf_handle(CF_ORDERS)?;
        let key = Self::child_key(tenant_id, order_id);
        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Fee operations

    /// Insert a fee unless one already exists for its sale. Returns true
    /// when the fee was written, false when the sale already had one.
    ///
    /// The existence check and the put are not one atomic operation; run a
    /// single fee writer per store (the event channel serializes the
    /// [`crate::FeeCalculator`]) so two writers cannot interleave here.
    pub fn insert_fee_if_absent(&self, fee: &FeeTransaction) -> Result<bool> {
        let cf = self.cf_handle(CF_FEES)?;
        let key = fee.sale_id.as_bytes();

        if self.db.get_cf(cf, key)?.is_some() {
            return Ok(false);
        }

        self.db.put_cf(cf, key, bincode::serialize(fee)?)?;
        Ok(true)
    }

    /// Get the fee derived from a sale, if any
    pub fn get_fee(&self, sale_id: Uuid) -> Result<Option<FeeTransaction>> {
        let cf = self.cf_handle(CF_FEES)?;
        match self.db.get_cf(cf, sale_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Key helpers

    fn movement_key(movement: &StockMovement) -> Vec<u8> {
        // tenant || product || movement_id: UUIDv7 keeps per-product time order
        let mut key = Self::item_key(movement.tenant_id, movement.product_id);
        key.extend_from_slice(movement.movement_id.as_bytes());
        key
    }

    fn child_key(tenant_id: TenantId, child_id: Uuid) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(tenant_id.as_bytes());
        key.extend_from_slice(child_id.as_bytes());
        key
    }

    fn index_key_txn_number(tenant_id: TenantId, number: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(17 + number.len());
        key.push(IDX_TXN_NUMBER);
        key.extend_from_slice(tenant_id.as_bytes());
        key.extend_from_slice(number.as_bytes());
        key
    }

    fn index_key_sale_history(tenant_id: TenantId, sale_id: Option<Uuid>) -> Vec<u8> {
        let mut key = Vec::with_capacity(33);
        key.push(IDX_SALE_HISTORY);
        key.extend_from_slice(tenant_id.as_bytes());
        if let Some(sid) = sale_id {
            key.extend_from_slice(sid.as_bytes());
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        FeeStatus, MovementReason, OrderChannel, PaymentMethod, PaymentStatus, SaleLine,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_item(tenant_id: TenantId, on_hand: i64) -> InventoryItem {
        InventoryItem {
            tenant_id,
            product_id: ProductId::new(),
            name: "Widget".to_string(),
            on_hand,
            reserved: 0,
            low_stock_threshold: 5,
            in_stock: on_hand > 0,
            updated_at: Utc::now(),
        }
    }

    fn test_sale(tenant_id: TenantId, number: &str) -> SaleTransaction {
        SaleTransaction {
            sale_id: Uuid::now_v7(),
            tenant_id,
            transaction_number: number.to_string(),
            lines: vec![SaleLine {
                product_id: ProductId::new(),
                name: "Widget".to_string(),
                quantity: 2,
                unit_price: Decimal::new(500, 2),
                line_total: Decimal::new(1000, 2),
            }],
            subtotal: Decimal::new(1000, 2),
            tax: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::new(1000, 2),
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Paid,
            shift_ref: None,
            customer_ref: None,
            warnings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn test_order(sale: &SaleTransaction) -> UnifiedOrder {
        UnifiedOrder {
            order_id: Uuid::now_v7(),
            tenant_id: sale.tenant_id,
            channel: OrderChannel::Pos,
            sale_id: sale.sale_id,
            transaction_number: sale.transaction_number.clone(),
            total: sale.total,
            created_at: sale.created_at,
        }
    }

    #[test]
    fn test_item_roundtrip() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();

        let item = test_item(tenant_id, 12);
        storage.put_item(&item).unwrap();

        let retrieved = storage.get_item(tenant_id, item.product_id).unwrap().unwrap();
        assert_eq!(retrieved.on_hand, 12);
        assert!(storage.get_item(tenant_id, ProductId::new()).unwrap().is_none());
    }

    #[test]
    fn test_tenant_items_isolated() {
        let (storage, _temp) = test_storage();
        let a = TenantId::new();
        let b = TenantId::new();

        storage.put_item(&test_item(a, 1)).unwrap();
        storage.put_item(&test_item(a, 2)).unwrap();
        storage.put_item(&test_item(b, 3)).unwrap();

        assert_eq!(storage.tenant_items(a).unwrap().len(), 2);
        assert_eq!(storage.tenant_items(b).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_sale_atomic_and_lookups() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();

        let mut item = test_item(tenant_id, 10);
        storage.put_item(&item).unwrap();
        item.on_hand = 8;

        let sale = test_sale(tenant_id, "TXN-20260831-A1B2C3");
        let movement = StockMovement {
            movement_id: Uuid::now_v7(),
            tenant_id,
            product_id: item.product_id,
            delta: -2,
            quantity_after: 8,
            reason: MovementReason::Sale,
            reference: Some(sale.transaction_number.clone()),
            created_at: Utc::now(),
        };
        let order = test_order(&sale);

        storage
            .commit_sale_atomic(&sale, &[item.clone()], &[movement], None, None, &order)
            .unwrap();

        assert_eq!(storage.get_item(tenant_id, item.product_id).unwrap().unwrap().on_hand, 8);
        assert!(storage.txn_number_exists(tenant_id, "TXN-20260831-A1B2C3").unwrap());
        assert!(!storage.txn_number_exists(tenant_id, "TXN-20260831-ZZZZZZ").unwrap());

        let found = storage
            .find_sale_by_number(tenant_id, "TXN-20260831-A1B2C3")
            .unwrap()
            .unwrap();
        assert_eq!(found.sale_id, sale.sale_id);

        assert_eq!(storage.tenant_sales(tenant_id).unwrap().len(), 1);
        assert_eq!(
            storage.product_movements(tenant_id, item.product_id).unwrap().len(),
            1
        );
        assert!(storage.get_order(tenant_id, order.order_id).unwrap().is_some());
    }

    #[test]
    fn test_fee_unique_per_sale() {
        let (storage, _temp) = test_storage();
        let tenant_id = TenantId::new();
        let sale_id = Uuid::now_v7();

        let fee = FeeTransaction {
            fee_id: Uuid::now_v7(),
            sale_id,
            tenant_id,
            sale_total: Decimal::new(1000, 2),
            rate: Decimal::new(2, 2),
            amount: Decimal::new(20, 2),
            status: FeeStatus::Pending,
            created_at: Utc::now(),
        };

        assert!(storage.insert_fee_if_absent(&fee).unwrap());
        assert!(!storage.insert_fee_if_absent(&fee).unwrap());

        let stored = storage.get_fee(sale_id).unwrap().unwrap();
        assert_eq!(stored.amount, Decimal::new(20, 2));
    }
}
