//! Core types for the sale engine
//!
//! Monetary values use exact `Decimal` arithmetic; quantities are `i64`.
//! Sale transactions, stock movements, unified orders and fee transactions
//! are write-once records; only inventory items (and the session/loyalty
//! accumulators) are mutable, and only under a row lock.

use chrono::{DateTime, Utc};
use credit_ledger::TenantId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sellable unit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(Uuid);

impl ProductId {
    /// Create new random product ID
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

    /// Raw bytes (storage key component)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One sellable unit's stock position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Owning tenant
    pub tenant_id: TenantId,

    /// Product
    pub product_id: ProductId,

    /// Display name (echoed into alerts and movement rows)
    pub name: String,

    /// On-hand quantity; never negative
    pub on_hand: i64,

    /// Reserved quantity (held for open orders); never negative
    pub reserved: i64,

    /// Low-stock alert threshold
    pub low_stock_threshold: i64,

    /// Cached "sellable right now" flag
    pub in_stock: bool,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Quantity actually available to sell
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    /// Alert level for the current on-hand quantity, if any
    pub fn alert_level(&self) -> Option<AlertLevel> {
        if self.on_hand <= 0 {
            Some(AlertLevel::OutOfStock)
        } else if self.low_stock_threshold > 0 && self.on_hand * 4 <= self.low_stock_threshold {
            // At or below 25% of the threshold
            Some(AlertLevel::Critical)
        } else if self.low_stock_threshold > 0 && self.on_hand <= self.low_stock_threshold {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }
}

/// Requested line of a sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemInput {
    /// Product being sold
    pub product_id: ProductId,

    /// Requested quantity; must be positive
    pub quantity: i64,

    /// Unit price charged
    pub unit_price: Decimal,
}

/// Committed line of a sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    /// Product sold
    pub product_id: ProductId,

    /// Product name at time of sale
    pub name: String,

    /// Quantity sold
    pub quantity: i64,

    /// Unit price charged
    pub unit_price: Decimal,

    /// quantity × unit_price
    pub line_total: Decimal,
}

/// A sale as requested by a terminal, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRequest {
    /// Requested lines; duplicates of the same product are aggregated
    pub line_items: Vec<LineItemInput>,

    /// Tender used
    pub payment_method: PaymentMethod,

    /// Discount applied to the whole sale
    pub discount: Decimal,

    /// Originating shift/session, if any
    pub shift_ref: Option<Uuid>,

    /// Customer, if known
    pub customer_ref: Option<Uuid>,
}

/// Tender used to pay a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Cash tender
    Cash,
    /// Card tender
    Card,
    /// Mobile wallet
    Mobile,
    /// Anything else (voucher, account, ...)
    Other,
}

/// Payment state of a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Fully paid at the terminal
    Paid,
    /// Payment pending (invoice, account sale)
    Pending,
}

/// Severity of a low-stock warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    /// Quantity reached zero
    OutOfStock,
    /// Quantity at or below 25% of the threshold
    Critical,
    /// Quantity at or below the threshold
    Warning,
}

/// Low-stock warning produced by a sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAlert {
    /// Product concerned
    pub product_id: ProductId,

    /// Product name
    pub name: String,

    /// Post-sale on-hand quantity
    pub remaining: i64,

    /// Configured threshold
    pub threshold: i64,

    /// Severity
    pub level: AlertLevel,
}

/// Completed point-of-sale or order transaction
///
/// `total = subtotal + tax − discount`, computed once at creation and
/// never mutated. Created atomically with its inventory decrements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleTransaction {
    /// Unique ID (UUIDv7)
    pub sale_id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Unique human-readable transaction number
    pub transaction_number: String,

    /// Line items
    pub lines: Vec<SaleLine>,

    /// Sum of line totals
    pub subtotal: Decimal,

    /// Tax applied
    pub tax: Decimal,

    /// Discount applied
    pub discount: Decimal,

    /// subtotal + tax − discount
    pub total: Decimal,

    /// Tender used
    pub payment_method: PaymentMethod,

    /// Payment state
    pub payment_status: PaymentStatus,

    /// Originating shift/session, if any
    pub shift_ref: Option<Uuid>,

    /// Customer, if known
    pub customer_ref: Option<Uuid>,

    /// Low-stock warnings produced by this sale
    pub warnings: Vec<StockAlert>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Why stock moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementReason {
    /// Decrement from a sale
    Sale,
    /// Increment from restocking
    Restock,
    /// Manual adjustment
    Adjustment,
}

/// Append-only inventory movement audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    /// Unique row ID (UUIDv7)
    pub movement_id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Product moved
    pub product_id: ProductId,

    /// Signed quantity change
    pub delta: i64,

    /// On-hand quantity after this movement
    pub quantity_after: i64,

    /// Reason for the movement
    pub reason: MovementReason,

    /// Reference to the causing record (transaction number, ...)
    pub reference: Option<String>,

    /// Movement timestamp
    pub created_at: DateTime<Utc>,
}

/// Running totals for one register shift/session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSession {
    /// Session ID
    pub session_id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Sales completed in this session
    pub sales_count: u64,

    /// Cash tender subtotal
    pub cash_total: Decimal,

    /// Card tender subtotal
    pub card_total: Decimal,

    /// Other tender subtotal
    pub other_total: Decimal,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl ShiftSession {
    /// Fresh session with zeroed totals
    pub fn new(session_id: Uuid, tenant_id: TenantId) -> Self {
        Self {
            session_id,
            tenant_id,
            sales_count: 0,
            cash_total: Decimal::ZERO,
            card_total: Decimal::ZERO,
            other_total: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Fold one completed sale into the running totals
    pub fn accumulate(&mut self, method: PaymentMethod, total: Decimal) {
        self.sales_count += 1;
        match method {
            PaymentMethod::Cash => self.cash_total += total,
            PaymentMethod::Card => self.card_total += total,
            PaymentMethod::Mobile | PaymentMethod::Other => self.other_total += total,
        }
        self.updated_at = Utc::now();
    }
}

/// Loyalty accumulator for a known customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerLoyalty {
    /// Customer ID
    pub customer_id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Accrued points
    pub points: i64,

    /// Lifetime spend
    pub lifetime_spend: Decimal,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Sales channel of a unified order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderChannel {
    /// Point of sale terminal
    Pos,
    /// Menu/marketplace order
    Menu,
    /// Wholesale order
    Wholesale,
    /// Retail web order
    Retail,
}

/// Cross-channel mirror of a sale for unified reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedOrder {
    /// Unique order ID
    pub order_id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Originating channel
    pub channel: OrderChannel,

    /// Underlying sale
    pub sale_id: Uuid,

    /// Transaction number of the sale
    pub transaction_number: String,

    /// Order total
    pub total: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// State of a platform fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    /// Derived, not yet collected
    Pending,
    /// Collected
    Settled,
}

/// Platform fee derived from a confirmed sale; unique per sale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeTransaction {
    /// Unique fee ID
    pub fee_id: Uuid,

    /// Sale this fee was derived from (uniqueness key)
    pub sale_id: Uuid,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Sale total the rate was applied to
    pub sale_total: Decimal,

    /// Fee rate applied
    pub rate: Decimal,

    /// Fee amount
    pub amount: Decimal,

    /// Fee state
    pub status: FeeStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// One line that failed stock validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientLine {
    /// Product concerned
    pub product_id: ProductId,

    /// Product name
    pub name: String,

    /// Quantity requested (aggregated across duplicate lines)
    pub requested: i64,

    /// Quantity actually available
    pub available: i64,
}

/// Outcome of an execute-sale call
///
/// Insufficient stock is a reported, non-fatal outcome carrying *every*
/// offending line, so a cashier sees the full correction list at once.
#[derive(Debug, Clone)]
pub enum SaleOutcome {
    /// Sale committed
    Completed {
        /// Sale ID
        sale_id: Uuid,
        /// Human-readable transaction number
        transaction_number: String,
        /// Computed total
        total: Decimal,
        /// Low-stock warnings produced by this sale
        warnings: Vec<StockAlert>,
    },

    /// One or more lines exceeded available stock; nothing was applied
    InsufficientStock {
        /// Every offending line
        lines: Vec<InsufficientLine>,
    },
}

impl SaleOutcome {
    /// Whether the sale was committed
    pub fn is_success(&self) -> bool {
        matches!(self, SaleOutcome::Completed { .. })
    }
}
