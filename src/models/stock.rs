// src/models/stock.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Aggregate stock row, one per (owner, product, warehouse). The quantity is
/// the sum over the active lots of the stock.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Stock {
    pub id: String,
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    pub barcode: String,
    /// Warehouse id.
    pub location: String,
    pub supplier_id: Option<String>,
    pub supplier_name: Option<String>,
    pub total_quantity: i64,
    pub threshold: i64,
    pub status: String,
    pub is_active: bool,
    pub last_restocked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stock decorated with its active lots and expiry information.
#[derive(Debug, Serialize)]
pub struct StockWithExpiry {
    #[serde(flatten)]
    pub stock: Stock,
    pub expiry_status: String,
    pub nearest_expiry_date: Option<DateTime<Utc>>,
    pub near_expiry_lots: i64,
    pub expired_lots: i64,
    pub lots: Vec<crate::models::StockLot>,
}

/// Append-only movement ledger.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct StockTransaction {
    pub id: String,
    pub user_id: String,
    pub stock_id: Option<String>,
    pub stock_lot_id: Option<String>,
    pub product_id: String,
    pub transaction_type: String,
    /// Signed for adjustments, positive otherwise.
    pub quantity: i64,
    pub cost_price: Option<f64>,
    pub reference_id: Option<String>,
    pub source: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStockRequest {
    #[validate(range(min = 0, message = "Quantity must be non-negative"))]
    pub total_quantity: Option<i64>,
    #[validate(range(min = 0, message = "Threshold must be non-negative"))]
    pub threshold: Option<i64>,
    #[validate(length(max = 255, message = "Location cannot exceed 255 characters"))]
    pub location: Option<String>,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnStockRequest {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i64,
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    pub reason: Option<String>,
}
