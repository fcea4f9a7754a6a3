// src/models/stock_lot.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One received batch of a product. Lots are created when a purchase order is
/// confirmed and only become active (and counted into stock) after QC passes.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct StockLot {
    pub id: String,
    pub user_id: String,
    pub stock_id: String,
    pub product_id: String,
    pub product_name: String,
    pub barcode: Option<String>,
    pub batch_number: String,
    pub purchase_order_id: Option<String>,
    pub purchase_order_number: Option<String>,
    pub supplier_id: Option<String>,
    /// Warehouse id.
    pub location: String,
    pub quantity: i64,
    pub remaining_qty: i64,
    pub failed_quantity: i64,
    pub cost_price: f64,
    pub sale_price: f64,
    pub status: String,
    pub qc_status: String,
    pub return_status: Option<String>,
    pub reason: Option<String>,
    pub is_active: bool,
    /// Set while the lot has not passed QC, and again once it is closed.
    pub is_temporary: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub last_restocked: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LotFilterQuery {
    pub status: Option<String>,
    pub qc_status: Option<String>,
    pub warehouse_id: Option<String>,
    pub supplier_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLotExpiryRequest {
    pub expiry_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLotQcRequest {
    #[validate(length(min = 1, max = 50, message = "QC status must be between 1 and 50 characters"))]
    pub qc_status: String,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CloseLotRequest {
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    pub reason: Option<String>,
    /// Final status for the closed lot, defaults to damaged goods.
    pub status: Option<String>,
}

/// Lots of one product looked up by barcode, with aggregate numbers.
#[derive(Debug, Serialize)]
pub struct LotsByBarcode {
    pub product_id: String,
    pub product_name: String,
    pub barcode: String,
    pub total_quantity: i64,
    pub lots: Vec<StockLot>,
}
