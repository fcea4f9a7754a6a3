// src/models/purchase_order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Purchase order header. Line items live in `purchase_order_items`,
/// supplier returns in `po_return_history`.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PurchaseOrder {
    pub id: String,
    pub user_id: String,
    pub purchase_order_number: String,
    pub invoice_number: Option<String>,
    pub supplier_id: String,
    pub supplier_company: Option<String>,
    /// Warehouse id the goods are received into.
    pub location: String,
    pub status: String,
    pub qc_status: String,
    pub total_amount: f64,
    pub total_returned_value: f64,
    pub total_amount_after_return: f64,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub qc_checked_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub barcode: Option<String>,
    pub quantity: i64,
    pub cost_price: f64,
    pub sale_price: f64,
    pub total: f64,
    /// Assigned at confirmation, together with the lot.
    pub batch_number: Option<String>,
    pub stock_lot_id: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_returned: bool,
    pub returned_quantity: i64,
    pub returned_value: f64,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PoReturnRecord {
    pub id: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub batch_number: Option<String>,
    pub returned_quantity: i64,
    pub returned_value: f64,
    pub reason: Option<String>,
    pub processed_by: Option<String>,
    pub returned_at: DateTime<Utc>,
}

/// Header + items + return history, as the API returns them.
#[derive(Debug, Serialize)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub supplier_name: Option<String>,
    pub warehouse_name: Option<String>,
    pub items: Vec<PurchaseOrderItem>,
    pub return_history: Vec<PoReturnRecord>,
}

/// Condensed row for the summary listing.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PurchaseOrderSummary {
    pub id: String,
    pub purchase_order_number: String,
    pub supplier_company: Option<String>,
    pub status: String,
    pub qc_status: String,
    pub total_amount: f64,
    pub item_count: i64,
    pub lot_count: i64,
    pub created_at: DateTime<Utc>,
}

// ==================== REQUEST DTOs ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    #[validate(length(min = 1, message = "Supplier id is required"))]
    pub supplier_id: String,
    #[validate(length(min = 1, message = "Warehouse id is required"))]
    pub warehouse_id: String,
    pub invoice_number: Option<String>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "A purchase order needs at least one item"))]
    #[validate(nested)]
    pub items: Vec<CreatePurchaseOrderItem>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderItem {
    #[validate(length(min = 1, message = "Product id is required"))]
    pub product_id: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i64,
    #[validate(range(min = 0.0, message = "Cost price must be non-negative"))]
    pub cost_price: f64,
    #[validate(range(min = 0.0, message = "Sale price must be non-negative"))]
    pub sale_price: Option<f64>,
    /// Carried onto the lot at confirmation.
    pub expiry_date: Option<DateTime<Utc>>,
}

/// Single-item return. The item is addressed by its id or its batch number.
#[derive(Debug, Deserialize, Validate)]
pub struct ReturnItemRequest {
    pub item_id: Option<String>,
    pub batch_number: Option<String>,
    #[validate(length(max = 500, message = "Reason cannot exceed 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnOrderRequest {
    pub reason: Option<String>,
}

/// Result of a full-return pass over a purchase order.
#[derive(Debug, Serialize)]
pub struct ReturnOutcome {
    pub returned_items: Vec<String>,
    pub skipped_items: Vec<String>,
    pub total_returned_value: f64,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64) -> CreatePurchaseOrderItem {
        CreatePurchaseOrderItem {
            product_id: "prod-1".to_string(),
            quantity,
            cost_price: 10.0,
            sale_price: None,
            expiry_date: None,
        }
    }

    #[test]
    fn test_create_request_requires_items() {
        let request = CreatePurchaseOrderRequest {
            supplier_id: "sup-1".to_string(),
            warehouse_id: "wh-1".to_string(),
            invoice_number: None,
            notes: None,
            items: vec![],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_create_request_validates_nested_items() {
        let request = CreatePurchaseOrderRequest {
            supplier_id: "sup-1".to_string(),
            warehouse_id: "wh-1".to_string(),
            invoice_number: None,
            notes: None,
            items: vec![line(0)],
        };
        assert!(request.validate().is_err());

        let request = CreatePurchaseOrderRequest {
            supplier_id: "sup-1".to_string(),
            warehouse_id: "wh-1".to_string(),
            invoice_number: None,
            notes: None,
            items: vec![line(3)],
        };
        assert!(request.validate().is_ok());
    }
}
