// src/models/mod.rs

pub mod catalog;
pub mod purchase_order;
pub mod qc;
pub mod receipt;
pub mod status;
pub mod stock;
pub mod stock_lot;
pub mod user;

pub use catalog::*;
pub use purchase_order::*;
pub use qc::*;
pub use receipt::*;
pub use stock::*;
pub use stock_lot::*;
pub use user::*;

use serde::Serialize;

// ==================== COMMON / SHARED ====================

/// Dashboard counters.
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_products: i64,
    pub total_stocks: i64,
    pub active_lots: i64,
    pub pending_purchase_orders: i64,
    pub awaiting_qc_purchase_orders: i64,
    pub low_stock_count: i64,
    pub out_of_stock_count: i64,
    pub near_expiry_lots: i64,
    pub expired_lots: i64,
}
