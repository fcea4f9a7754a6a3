// src/models/receipt.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub sale_id: Option<String>,
    pub payment_method: String,
    pub amount: f64,
    pub status: String,
    pub employee_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Receipt {
    pub id: String,
    pub user_id: String,
    pub payment_id: String,
    pub employee_name: Option<String>,
    /// JSON array of `{name, quantity, subtotal}` objects.
    pub items: String,
    pub total_price: f64,
    pub amount_paid: f64,
    pub change_amount: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: i64,
    pub subtotal: f64,
}

/// Receipt joined with its payment, items decoded.
#[derive(Debug, Serialize)]
pub struct ReceiptDetail {
    pub id: String,
    pub payment_id: String,
    pub payment_method: String,
    pub payment_status: String,
    pub employee_name: Option<String>,
    pub items: Vec<ReceiptItem>,
    pub total_price: f64,
    pub amount_paid: f64,
    pub change_amount: f64,
    pub created_at: DateTime<Utc>,
}

impl ReceiptDetail {
    pub fn from_parts(receipt: Receipt, payment_method: String, payment_status: String) -> Self {
        let items = serde_json::from_str(&receipt.items).unwrap_or_default();
        ReceiptDetail {
            id: receipt.id,
            payment_id: receipt.payment_id,
            payment_method,
            payment_status,
            employee_name: receipt.employee_name,
            items,
            total_price: receipt.total_price,
            amount_paid: receipt.amount_paid,
            change_amount: receipt.change_amount,
            created_at: receipt.created_at,
        }
    }
}

/// Per-receipt breakdown inside a summary window.
#[derive(Debug, Serialize)]
pub struct ReceiptWindowEntry {
    pub employee_name: Option<String>,
    pub items: Vec<ReceiptItem>,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
}

/// One aggregation window for the receipt summary endpoint.
#[derive(Debug, Serialize, Default)]
pub struct ReceiptPeriodSummary {
    pub receipt_count: i64,
    pub total_price: f64,
    pub amount_paid: f64,
    pub change_amount: f64,
    pub details: Vec<ReceiptWindowEntry>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptSummary {
    pub today: ReceiptPeriodSummary,
    pub this_week: ReceiptPeriodSummary,
    pub this_month: ReceiptPeriodSummary,
}
