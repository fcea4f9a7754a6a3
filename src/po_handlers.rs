// src/po_handlers.rs - Purchase order lifecycle
//
// A purchase order moves through: created (รอดำเนินการ), confirmed
// (ได้รับสินค้าแล้ว, lots spawned awaiting QC), QC resolution, and for failed
// goods a supplier-return pass. Stock totals are only ever touched by the QC
// pass, never here.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{get_current_user, resolve_owner_id, Claims};
use crate::codes::{generate_batch_number, generate_invoice_number, generate_po_number, normalize_code};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::status;
use crate::models::{
    CreatePurchaseOrderRequest, PoReturnRecord, Product, PurchaseOrder, PurchaseOrderDetail,
    PurchaseOrderItem, PurchaseOrderSummary, ReturnItemRequest, ReturnOrderRequest, ReturnOutcome,
    Supplier, Warehouse,
};
use crate::stock_handlers::recompute_stock_total;
use crate::AppState;

/// Default low-stock threshold for stocks created on confirmation.
const DEFAULT_THRESHOLD: i64 = 5;

// ==================== PURE HELPERS ====================

/// Per-item state used to recompute the order status after returns.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub quantity: i64,
    pub failed_quantity: i64,
    pub lot_qc_status: String,
    pub is_returned: bool,
}

impl ItemOutcome {
    fn has_failure(&self) -> bool {
        self.lot_qc_status == status::qc::FAILED || self.failed_quantity > 0
    }

    fn has_passed_quantity(&self) -> bool {
        match self.lot_qc_status.as_str() {
            s if s == status::qc::PASSED => true,
            s if s == status::qc::PARTIAL => self.quantity > self.failed_quantity,
            _ => false,
        }
    }
}

/// Quantity to send back to the supplier for one item: everything on a full
/// QC fail, otherwise the failed quantity clamped to the item quantity.
pub fn compute_return_qty(item: &ItemOutcome) -> i64 {
    if item.lot_qc_status == status::qc::FAILED {
        item.quantity
    } else {
        item.failed_quantity.min(item.quantity).max(0)
    }
}

/// Recompute the order status after a return pass.
pub fn recompute_po_status(items: &[ItemOutcome]) -> &'static str {
    let outstanding = items
        .iter()
        .any(|item| item.has_failure() && !item.is_returned);
    if outstanding {
        return status::po::QC_FAILED_PARTIALLY_RETURNED;
    }

    if items.iter().any(|item| item.has_passed_quantity()) {
        status::po::QC_PARTIAL
    } else {
        status::po::QC_FAILED_RETURNED
    }
}

// ==================== QUERY HELPERS ====================

fn owner_of(http_request: &HttpRequest) -> ApiResult<(Claims, String)> {
    let claims = get_current_user(http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    Ok((claims, owner_id))
}

async fn find_po(
    pool: &sqlx::SqlitePool,
    owner_id: &str,
    po_id: &str,
) -> ApiResult<PurchaseOrder> {
    sqlx::query_as("SELECT * FROM purchase_orders WHERE id = ? AND user_id = ?")
        .bind(po_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::purchase_order_not_found(po_id))
}

async fn load_detail(
    pool: &sqlx::SqlitePool,
    order: PurchaseOrder,
) -> ApiResult<PurchaseOrderDetail> {
    let items: Vec<PurchaseOrderItem> =
        sqlx::query_as("SELECT * FROM purchase_order_items WHERE purchase_order_id = ?")
            .bind(&order.id)
            .fetch_all(pool)
            .await?;

    let return_history: Vec<PoReturnRecord> = sqlx::query_as(
        "SELECT * FROM po_return_history WHERE purchase_order_id = ? ORDER BY returned_at",
    )
    .bind(&order.id)
    .fetch_all(pool)
    .await?;

    let supplier_name: Option<(String,)> =
        sqlx::query_as("SELECT name FROM suppliers WHERE id = ?")
            .bind(&order.supplier_id)
            .fetch_optional(pool)
            .await?;

    let warehouse_name: Option<(String,)> =
        sqlx::query_as("SELECT name FROM warehouses WHERE id = ?")
            .bind(&order.location)
            .fetch_optional(pool)
            .await?;

    Ok(PurchaseOrderDetail {
        order,
        supplier_name: supplier_name.map(|r| r.0),
        warehouse_name: warehouse_name.map(|r| r.0),
        items,
        return_history,
    })
}

async fn item_outcomes(
    pool: &sqlx::SqlitePool,
    items: &[PurchaseOrderItem],
) -> ApiResult<Vec<ItemOutcome>> {
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        let lot_state: Option<(String, i64)> = match &item.stock_lot_id {
            Some(lot_id) => {
                sqlx::query_as("SELECT qc_status, failed_quantity FROM stock_lots WHERE id = ?")
                    .bind(lot_id)
                    .fetch_optional(pool)
                    .await?
            }
            None => None,
        };
        let (qc_status, failed_quantity) =
            lot_state.unwrap_or_else(|| (status::qc::PENDING.to_string(), 0));
        outcomes.push(ItemOutcome {
            quantity: item.quantity,
            failed_quantity,
            lot_qc_status: qc_status,
            is_returned: item.is_returned,
        });
    }
    Ok(outcomes)
}

// ==================== READ HANDLERS ====================

pub async fn get_purchase_orders(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let (_, owner_id) = owner_of(&http_request)?;

    let orders: Vec<PurchaseOrder> = sqlx::query_as(
        "SELECT * FROM purchase_orders WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&owner_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    let mut details = Vec::with_capacity(orders.len());
    for order in orders {
        details.push(load_detail(&app_state.db_pool, order).await?);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(details)))
}

pub async fn get_purchase_order_summary(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let (_, owner_id) = owner_of(&http_request)?;

    let rows: Vec<PurchaseOrderSummary> = sqlx::query_as(
        r#"SELECT po.id, po.purchase_order_number, po.supplier_company, po.status,
                  po.qc_status, po.total_amount, po.created_at,
                  (SELECT COUNT(*) FROM purchase_order_items i WHERE i.purchase_order_id = po.id)
                      AS item_count,
                  (SELECT COUNT(*) FROM stock_lots l WHERE l.purchase_order_id = po.id)
                      AS lot_count
           FROM purchase_orders po
           WHERE po.user_id = ?
           ORDER BY po.created_at DESC"#,
    )
    .bind(&owner_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(rows)))
}

pub async fn get_purchase_order(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let po_id = path.into_inner();
    let (_, owner_id) = owner_of(&http_request)?;

    let order = find_po(&app_state.db_pool, &owner_id, &po_id).await?;
    let detail = load_detail(&app_state.db_pool, order).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(detail)))
}

// ==================== CREATE ====================

pub async fn create_purchase_order(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreatePurchaseOrderRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    let supplier: Supplier =
        sqlx::query_as("SELECT * FROM suppliers WHERE id = ? AND user_id = ?")
            .bind(&request.supplier_id)
            .bind(&owner_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::bad_request("Unknown supplier"))?;

    let warehouse: Warehouse =
        sqlx::query_as("SELECT * FROM warehouses WHERE id = ? AND user_id = ?")
            .bind(&request.warehouse_id)
            .bind(&owner_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::bad_request("Unknown warehouse"))?;

    let now = Utc::now();
    let po_id = Uuid::new_v4().to_string();
    let mut total_amount = 0.0;

    let mut tx = pool.begin().await?;

    let mut items = Vec::with_capacity(request.items.len());
    for line in &request.items {
        let product: Product =
            sqlx::query_as("SELECT * FROM products WHERE id = ? AND user_id = ?")
                .bind(&line.product_id)
                .bind(&owner_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    ApiError::bad_request(&format!("Unknown product '{}'", line.product_id))
                })?;

        let total = line.quantity as f64 * line.cost_price;
        total_amount += total;

        let item = PurchaseOrderItem {
            id: Uuid::new_v4().to_string(),
            purchase_order_id: po_id.clone(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            barcode: Some(product.barcode.clone()),
            quantity: line.quantity,
            cost_price: line.cost_price,
            sale_price: line.sale_price.unwrap_or(product.price),
            total,
            batch_number: None,
            stock_lot_id: None,
            expiry_date: line.expiry_date,
            is_returned: false,
            returned_quantity: 0,
            returned_value: 0.0,
        };

        sqlx::query(
            r#"INSERT INTO purchase_order_items (
                id, purchase_order_id, product_id, product_name, barcode,
                quantity, cost_price, sale_price, total, expiry_date,
                batch_number, stock_lot_id, is_returned, returned_quantity, returned_value
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, 0, 0, 0)"#,
        )
        .bind(&item.id)
        .bind(&item.purchase_order_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(&item.barcode)
        .bind(item.quantity)
        .bind(item.cost_price)
        .bind(item.sale_price)
        .bind(item.total)
        .bind(item.expiry_date)
        .execute(&mut *tx)
        .await?;

        items.push(item);
    }

    let invoice_number = request
        .invoice_number
        .clone()
        .unwrap_or_else(generate_invoice_number);

    let order = PurchaseOrder {
        id: po_id.clone(),
        user_id: owner_id.clone(),
        purchase_order_number: generate_po_number(),
        invoice_number: Some(invoice_number),
        supplier_id: supplier.id.clone(),
        supplier_company: supplier.company_name.clone().or(Some(supplier.name.clone())),
        location: warehouse.id.clone(),
        status: status::po::PENDING.to_string(),
        qc_status: status::qc::PENDING.to_string(),
        total_amount,
        total_returned_value: 0.0,
        total_amount_after_return: total_amount,
        notes: request.notes.clone(),
        created_by: Some(claims.username.clone()),
        updated_by: None,
        received_at: None,
        qc_checked_at: None,
        returned_at: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"INSERT INTO purchase_orders (
            id, user_id, purchase_order_number, invoice_number, supplier_id,
            supplier_company, location, status, qc_status,
            total_amount, total_returned_value, total_amount_after_return,
            notes, created_by, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)"#,
    )
    .bind(&order.id)
    .bind(&order.user_id)
    .bind(&order.purchase_order_number)
    .bind(&order.invoice_number)
    .bind(&order.supplier_id)
    .bind(&order.supplier_company)
    .bind(&order.location)
    .bind(&order.status)
    .bind(&order.qc_status)
    .bind(order.total_amount)
    .bind(order.total_amount_after_return)
    .bind(&order.notes)
    .bind(&order.created_by)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Purchase order {} created by {} ({} items, {:.2})",
        order.purchase_order_number,
        claims.username,
        items.len(),
        total_amount
    );

    let detail = load_detail(pool, order).await?;
    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        detail,
        "Purchase order created successfully".to_string(),
    )))
}

// ==================== CONFIRM ====================

pub async fn confirm_purchase_order(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let po_id = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    let order = find_po(pool, &owner_id, &po_id).await?;
    if order.status != status::po::PENDING {
        return Err(ApiError::invalid_po_transition(&order.status));
    }

    let items: Vec<PurchaseOrderItem> =
        sqlx::query_as("SELECT * FROM purchase_order_items WHERE purchase_order_id = ?")
            .bind(&order.id)
            .fetch_all(pool)
            .await?;

    let supplier: Option<Supplier> = sqlx::query_as("SELECT * FROM suppliers WHERE id = ?")
        .bind(&order.supplier_id)
        .fetch_optional(pool)
        .await?;
    let warehouse: Option<Warehouse> = sqlx::query_as("SELECT * FROM warehouses WHERE id = ?")
        .bind(&order.location)
        .fetch_optional(pool)
        .await?;

    let warehouse_code = warehouse
        .as_ref()
        .map(|w| normalize_code(&w.name))
        .unwrap_or_else(|| "XX".to_string());
    let supplier_code = supplier
        .as_ref()
        .map(|s| normalize_code(&s.name))
        .unwrap_or_else(|| "XX".to_string());
    let supplier_name = supplier.as_ref().map(|s| s.name.clone());

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for item in &items {
        let batch_number = item
            .batch_number
            .clone()
            .unwrap_or_else(|| generate_batch_number(&warehouse_code, &supplier_code));

        // Find or create the aggregate stock row, without touching quantities
        let stock_id: String = match sqlx::query_as::<_, (String,)>(
            "SELECT id FROM stocks WHERE user_id = ? AND product_id = ? AND location = ?",
        )
        .bind(&owner_id)
        .bind(&item.product_id)
        .bind(&order.location)
        .fetch_optional(&mut *tx)
        .await?
        {
            Some((id,)) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                sqlx::query(
                    r#"INSERT INTO stocks (
                        id, user_id, product_id, product_name, barcode, location,
                        supplier_id, supplier_name, total_quantity, threshold, status,
                        is_active, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, 1, ?, ?)"#,
                )
                .bind(&id)
                .bind(&owner_id)
                .bind(&item.product_id)
                .bind(&item.product_name)
                .bind(item.barcode.as_deref().unwrap_or(""))
                .bind(&order.location)
                .bind(&order.supplier_id)
                .bind(&supplier_name)
                .bind(DEFAULT_THRESHOLD)
                .bind(status::stock::AVAILABLE)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        let lot_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"INSERT INTO stock_lots (
                id, user_id, stock_id, product_id, product_name, barcode, batch_number,
                purchase_order_id, purchase_order_number, supplier_id, location,
                quantity, remaining_qty, failed_quantity, cost_price, sale_price,
                status, qc_status, expiry_date, is_active, is_temporary, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?, ?, ?, 0, 1, ?, ?)"#,
        )
        .bind(&lot_id)
        .bind(&owner_id)
        .bind(&stock_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(&item.barcode)
        .bind(&batch_number)
        .bind(&order.id)
        .bind(&order.purchase_order_number)
        .bind(&order.supplier_id)
        .bind(&order.location)
        .bind(item.quantity)
        .bind(item.cost_price)
        .bind(item.sale_price)
        .bind(status::lot::AWAITING_QC)
        .bind(status::qc::PENDING)
        .bind(item.expiry_date)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE purchase_order_items SET batch_number = ?, stock_lot_id = ? WHERE id = ?",
        )
        .bind(&batch_number)
        .bind(&lot_id)
        .bind(&item.id)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"UPDATE purchase_orders
           SET status = ?, qc_status = ?, received_at = ?, updated_by = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(status::po::RECEIVED)
    .bind(status::qc::PENDING)
    .bind(now)
    .bind(&claims.username)
    .bind(now)
    .bind(&order.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Purchase order {} confirmed by {} ({} lots created)",
        order.purchase_order_number,
        claims.username,
        items.len()
    );

    let order = find_po(pool, &owner_id, &po_id).await?;
    let detail = load_detail(pool, order).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        detail,
        "Purchase order confirmed, lots awaiting QC".to_string(),
    )))
}

// ==================== RETURNS ====================

struct ItemReturn {
    returned_qty: i64,
    returned_value: f64,
}

/// Apply a supplier return to one item and its lot. Caller updates the order
/// header afterwards.
async fn apply_item_return(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order: &PurchaseOrder,
    item: &PurchaseOrderItem,
    outcome: &ItemOutcome,
    reason: Option<&str>,
    processed_by: &str,
) -> ApiResult<ItemReturn> {
    let returned_qty = compute_return_qty(outcome);
    if returned_qty <= 0 {
        return Err(ApiError::nothing_to_return());
    }
    let returned_value = returned_qty as f64 * item.cost_price;
    let now = Utc::now();
    let full_return = outcome.lot_qc_status == status::qc::FAILED || returned_qty >= item.quantity;

    sqlx::query(
        r#"UPDATE purchase_order_items
           SET is_returned = 1, returned_quantity = ?, returned_value = ?
           WHERE id = ?"#,
    )
    .bind(returned_qty)
    .bind(returned_value)
    .bind(&item.id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"INSERT INTO po_return_history (
            id, purchase_order_id, product_id, product_name, batch_number,
            returned_quantity, returned_value, reason, processed_by, returned_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&order.id)
    .bind(&item.product_id)
    .bind(&item.product_name)
    .bind(&item.batch_number)
    .bind(returned_qty)
    .bind(returned_value)
    .bind(reason)
    .bind(processed_by)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    if let Some(lot_id) = &item.stock_lot_id {
        if full_return {
            sqlx::query(
                r#"UPDATE stock_lots
                   SET status = ?, return_status = ?, is_active = 0, is_temporary = 1,
                       remaining_qty = 0, failed_quantity = 0, updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(status::lot::CLOSED)
            .bind(status::lot_return::FULL)
            .bind(now)
            .bind(lot_id)
            .execute(&mut **tx)
            .await?;
        } else {
            sqlx::query(
                r#"UPDATE stock_lots
                   SET status = ?, return_status = ?,
                       failed_quantity = MAX(0, failed_quantity - ?),
                       remaining_qty = MAX(0, remaining_qty - ?),
                       updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(status::lot::SELLABLE)
            .bind(status::lot_return::PARTIAL)
            .bind(returned_qty)
            .bind(returned_qty)
            .bind(now)
            .bind(lot_id)
            .execute(&mut **tx)
            .await?;
        }

        let stock_id: Option<(String,)> =
            sqlx::query_as("SELECT stock_id FROM stock_lots WHERE id = ?")
                .bind(lot_id)
                .fetch_optional(&mut **tx)
                .await?;
        if let Some((stock_id,)) = stock_id {
            recompute_stock_total(tx, &stock_id).await?;
        }
    }

    Ok(ItemReturn {
        returned_qty,
        returned_value,
    })
}

async fn update_po_after_return(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order: &PurchaseOrder,
    added_value: f64,
    new_status: &str,
    updated_by: &str,
) -> ApiResult<()> {
    let total_returned = order.total_returned_value + added_value;
    sqlx::query(
        r#"UPDATE purchase_orders
           SET status = ?, total_returned_value = ?, total_amount_after_return = ?,
               returned_at = ?, updated_by = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(new_status)
    .bind(total_returned)
    .bind(order.total_amount - total_returned)
    .bind(Utc::now())
    .bind(updated_by)
    .bind(Utc::now())
    .bind(&order.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn return_purchase_order(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<ReturnOrderRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let po_id = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    let order = find_po(pool, &owner_id, &po_id).await?;
    if !status::po::RETURNABLE.contains(&order.status.as_str()) {
        return Err(ApiError::invalid_po_transition(&order.status));
    }

    let items: Vec<PurchaseOrderItem> =
        sqlx::query_as("SELECT * FROM purchase_order_items WHERE purchase_order_id = ?")
            .bind(&order.id)
            .fetch_all(pool)
            .await?;
    let outcomes = item_outcomes(pool, &items).await?;

    let mut tx = pool.begin().await?;

    let mut returned_items = Vec::new();
    let mut skipped_items = Vec::new();
    let mut added_value = 0.0;
    let mut final_outcomes = Vec::with_capacity(items.len());

    for (item, outcome) in items.iter().zip(outcomes.iter()) {
        let mut outcome = outcome.clone();
        if item.is_returned {
            skipped_items.push(item.product_name.clone());
        } else if outcome.has_failure() {
            let result = apply_item_return(
                &mut tx,
                &order,
                item,
                &outcome,
                request.reason.as_deref(),
                &claims.username,
            )
            .await?;
            added_value += result.returned_value;
            outcome.is_returned = true;
            returned_items.push(format!("{} x{}", item.product_name, result.returned_qty));
        }
        final_outcomes.push(outcome);
    }

    if returned_items.is_empty() {
        return Err(ApiError::nothing_to_return());
    }

    let new_status = recompute_po_status(&final_outcomes);
    update_po_after_return(&mut tx, &order, added_value, new_status, &claims.username).await?;

    tx.commit().await?;

    log::info!(
        "Return pass on {} by {}: {} returned, {} skipped",
        order.purchase_order_number,
        claims.username,
        returned_items.len(),
        skipped_items.len()
    );

    let outcome = ReturnOutcome {
        returned_items,
        skipped_items,
        total_returned_value: order.total_returned_value + added_value,
        status: new_status.to_string(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        outcome,
        "Return processed successfully".to_string(),
    )))
}

pub async fn return_purchase_order_item(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<ReturnItemRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    if request.item_id.is_none() && request.batch_number.is_none() {
        return Err(ApiError::bad_request("Specify item_id or batch_number"));
    }
    let po_id = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    // Unlike the full-return pass, a single item can be sent back as soon as
    // its batch fails inspection, so there is no order-status gate here.
    let order = find_po(pool, &owner_id, &po_id).await?;

    let items: Vec<PurchaseOrderItem> =
        sqlx::query_as("SELECT * FROM purchase_order_items WHERE purchase_order_id = ?")
            .bind(&order.id)
            .fetch_all(pool)
            .await?;

    let item = items
        .iter()
        .find(|item| {
            request
                .item_id
                .as_ref()
                .map(|id| &item.id == id)
                .unwrap_or(false)
                || request
                    .batch_number
                    .as_ref()
                    .map(|b| item.batch_number.as_ref() == Some(b))
                    .unwrap_or(false)
        })
        .ok_or_else(|| ApiError::not_found("Purchase order item"))?;

    if item.is_returned {
        return Err(ApiError::BadRequest(format!(
            "Item '{}' has already been returned",
            item.product_name
        )));
    }

    let batch_number = item
        .batch_number
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Item has no batch number yet"))?;

    // The latest inspection of the batch decides eligibility and quantity
    let qc_record: Option<(String, i64)> = sqlx::query_as(
        r#"SELECT status, failed_quantity FROM quality_controls
           WHERE batch_number = ? AND user_id = ?
           ORDER BY created_at DESC LIMIT 1"#,
    )
    .bind(batch_number)
    .bind(&owner_id)
    .fetch_optional(pool)
    .await?;
    let (qc_record_status, qc_failed_quantity) = match qc_record {
        Some(record) => record,
        None => return Err(ApiError::qc_record_not_found(batch_number)),
    };
    if qc_record_status != status::qc::FAILED && qc_record_status != status::qc::PARTIAL {
        return Err(ApiError::bad_request(&format!(
            "Batch '{}' has not failed QC",
            batch_number
        )));
    }

    let outcome = &ItemOutcome {
        quantity: item.quantity,
        failed_quantity: qc_failed_quantity,
        lot_qc_status: qc_record_status,
        is_returned: item.is_returned,
    };

    let mut tx = pool.begin().await?;

    let result = apply_item_return(
        &mut tx,
        &order,
        item,
        outcome,
        request.reason.as_deref(),
        &claims.username,
    )
    .await?;

    // Recompute over all items with this one flagged returned
    let mut all_outcomes = item_outcomes_in_tx(&mut tx, &items).await?;
    for (i, it) in items.iter().enumerate() {
        if it.id == item.id {
            all_outcomes[i].is_returned = true;
        }
    }
    let new_status = recompute_po_status(&all_outcomes);
    update_po_after_return(&mut tx, &order, result.returned_value, new_status, &claims.username)
        .await?;

    tx.commit().await?;

    log::info!(
        "Item {} returned from {} by {} (qty {})",
        item.product_name,
        order.purchase_order_number,
        claims.username,
        result.returned_qty
    );

    let outcome = ReturnOutcome {
        returned_items: vec![format!("{} x{}", item.product_name, result.returned_qty)],
        skipped_items: vec![],
        total_returned_value: order.total_returned_value + result.returned_value,
        status: new_status.to_string(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        outcome,
        "Item returned successfully".to_string(),
    )))
}

async fn item_outcomes_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    items: &[PurchaseOrderItem],
) -> ApiResult<Vec<ItemOutcome>> {
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        let lot_state: Option<(String, i64)> = match &item.stock_lot_id {
            Some(lot_id) => {
                sqlx::query_as("SELECT qc_status, failed_quantity FROM stock_lots WHERE id = ?")
                    .bind(lot_id)
                    .fetch_optional(&mut **tx)
                    .await?
            }
            None => None,
        };
        let (qc_status, failed_quantity) =
            lot_state.unwrap_or_else(|| (status::qc::PENDING.to_string(), 0));
        outcomes.push(ItemOutcome {
            quantity: item.quantity,
            failed_quantity,
            lot_qc_status: qc_status,
            is_returned: item.is_returned,
        });
    }
    Ok(outcomes)
}

// ==================== CANCEL ====================

pub async fn cancel_purchase_order(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let po_id = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    let order = find_po(pool, &owner_id, &po_id).await?;
    if order.status != status::po::PENDING {
        return Err(ApiError::invalid_po_transition(&order.status));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM stock_lots WHERE purchase_order_id = ? AND user_id = ?")
        .bind(&order.id)
        .bind(&owner_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE purchase_orders SET status = ?, updated_by = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status::po::CANCELLED)
    .bind(&claims.username)
    .bind(Utc::now())
    .bind(&order.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Purchase order {} cancelled by {}",
        order.purchase_order_number,
        claims.username
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Purchase order cancelled".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(quantity: i64, failed: i64, qc: &str, returned: bool) -> ItemOutcome {
        ItemOutcome {
            quantity,
            failed_quantity: failed,
            lot_qc_status: qc.to_string(),
            is_returned: returned,
        }
    }

    #[test]
    fn test_compute_return_qty_full_fail_returns_everything() {
        let item = outcome(10, 3, status::qc::FAILED, false);
        assert_eq!(compute_return_qty(&item), 10);
    }

    #[test]
    fn test_compute_return_qty_partial_clamped_to_quantity() {
        let item = outcome(10, 4, status::qc::PARTIAL, false);
        assert_eq!(compute_return_qty(&item), 4);

        let overshoot = outcome(10, 15, status::qc::PARTIAL, false);
        assert_eq!(compute_return_qty(&overshoot), 10);

        let negative = outcome(10, -2, status::qc::PARTIAL, false);
        assert_eq!(compute_return_qty(&negative), 0);
    }

    #[test]
    fn test_recompute_po_status_outstanding_returns() {
        let items = vec![
            outcome(10, 10, status::qc::FAILED, true),
            outcome(5, 2, status::qc::PARTIAL, false),
        ];
        assert_eq!(
            recompute_po_status(&items),
            status::po::QC_FAILED_PARTIALLY_RETURNED
        );
    }

    #[test]
    fn test_recompute_po_status_all_failed_returned() {
        let items = vec![
            outcome(10, 10, status::qc::FAILED, true),
            outcome(5, 5, status::qc::FAILED, true),
        ];
        assert_eq!(recompute_po_status(&items), status::po::QC_FAILED_RETURNED);
    }

    #[test]
    fn test_recompute_po_status_some_quantity_passed() {
        let items = vec![
            outcome(10, 10, status::qc::FAILED, true),
            outcome(5, 2, status::qc::PARTIAL, true),
        ];
        assert_eq!(recompute_po_status(&items), status::po::QC_PARTIAL);

        let items = vec![
            outcome(10, 10, status::qc::FAILED, true),
            outcome(5, 0, status::qc::PASSED, false),
        ];
        assert_eq!(recompute_po_status(&items), status::po::QC_PARTIAL);
    }

    // ==================== WORKFLOW TESTS ====================

    use crate::models::CreateQcRequest;
    use crate::test_support::{
        app_state, confirm_order, create_order, request_with, seed_catalog, seed_owner, test_pool,
    };

    #[tokio::test]
    async fn test_confirm_spawns_one_awaiting_qc_lot_per_item() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        let (supplier_id, warehouse_id, product_id) = seed_catalog(&pool, &claims.sub).await;
        let state = app_state(pool);

        let po_id =
            create_order(&state, &claims, &supplier_id, &warehouse_id, &product_id, 10).await;
        confirm_order(&state, &claims, &po_id).await;

        let lots: Vec<(String, i64, i64, bool, Option<chrono::DateTime<Utc>>)> = sqlx::query_as(
            r#"SELECT status, quantity, remaining_qty, is_active, expiry_date
               FROM stock_lots WHERE purchase_order_id = ?"#,
        )
        .bind(&po_id)
        .fetch_all(&state.db_pool)
        .await
        .unwrap();

        assert_eq!(lots.len(), 1);
        let (lot_status, quantity, remaining, is_active, expiry) =
            lots.into_iter().next().unwrap();
        assert_eq!(lot_status, status::lot::AWAITING_QC);
        assert_eq!(quantity, 10);
        assert_eq!(remaining, 0);
        assert!(!is_active);
        assert!(expiry.is_some());
    }

    #[tokio::test]
    async fn test_cancel_only_while_pending_and_drops_lots() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        let (supplier_id, warehouse_id, product_id) = seed_catalog(&pool, &claims.sub).await;
        let state = app_state(pool);

        let po_id =
            create_order(&state, &claims, &supplier_id, &warehouse_id, &product_id, 5).await;
        cancel_purchase_order(state.clone(), web::Path::from(po_id.clone()), request_with(&claims))
            .await
            .unwrap();

        let (order_status,): (String,) =
            sqlx::query_as("SELECT status FROM purchase_orders WHERE id = ?")
                .bind(&po_id)
                .fetch_one(&state.db_pool)
                .await
                .unwrap();
        assert_eq!(order_status, status::po::CANCELLED);

        let (lot_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM stock_lots WHERE purchase_order_id = ?")
                .bind(&po_id)
                .fetch_one(&state.db_pool)
                .await
                .unwrap();
        assert_eq!(lot_count, 0);

        let other =
            create_order(&state, &claims, &supplier_id, &warehouse_id, &product_id, 5).await;
        confirm_order(&state, &claims, &other).await;
        let result =
            cancel_purchase_order(state.clone(), web::Path::from(other), request_with(&claims))
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_item_return_allowed_once_batch_fails_inspection() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        let (supplier_id, warehouse_id, product_id) = seed_catalog(&pool, &claims.sub).await;
        let state = app_state(pool);

        let po_id =
            create_order(&state, &claims, &supplier_id, &warehouse_id, &product_id, 10).await;
        confirm_order(&state, &claims, &po_id).await;

        let (batch_number,): (String,) = sqlx::query_as(
            "SELECT batch_number FROM purchase_order_items WHERE purchase_order_id = ?",
        )
        .bind(&po_id)
        .fetch_one(&state.db_pool)
        .await
        .unwrap();

        crate::qc_handlers::create_qc_record(
            state.clone(),
            web::Json(CreateQcRequest {
                batch_number: batch_number.clone(),
                product_id: None,
                supplier_id: None,
                warehouse_id: None,
                total_quantity: 10,
                passed_quantity: 8,
                failed_quantity: 2,
                temperature: None,
                humidity: None,
                status: None,
                issues: None,
                attachments: None,
                remarks: None,
            }),
            request_with(&claims),
        )
        .await
        .unwrap();

        // The order is still in the received state; the batch inspection
        // alone decides eligibility
        let response = return_purchase_order_item(
            state.clone(),
            web::Path::from(po_id.clone()),
            web::Json(ReturnItemRequest {
                item_id: None,
                batch_number: Some(batch_number),
                reason: Some("ของแตกระหว่างขนส่ง".to_string()),
            }),
            request_with(&claims),
        )
        .await;
        assert!(response.is_ok());

        let (returned_qty,): (i64,) = sqlx::query_as(
            "SELECT returned_quantity FROM purchase_order_items WHERE purchase_order_id = ?",
        )
        .bind(&po_id)
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
        assert_eq!(returned_qty, 2);

        let (order_status,): (String,) =
            sqlx::query_as("SELECT status FROM purchase_orders WHERE id = ?")
                .bind(&po_id)
                .fetch_one(&state.db_pool)
                .await
                .unwrap();
        assert_eq!(order_status, status::po::QC_PARTIAL);
    }

    #[tokio::test]
    async fn test_item_return_needs_an_item_reference() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        let (supplier_id, warehouse_id, product_id) = seed_catalog(&pool, &claims.sub).await;
        let state = app_state(pool);

        let po_id =
            create_order(&state, &claims, &supplier_id, &warehouse_id, &product_id, 4).await;

        let err = return_purchase_order_item(
            state.clone(),
            web::Path::from(po_id),
            web::Json(ReturnItemRequest {
                item_id: None,
                batch_number: None,
                reason: None,
            }),
            request_with(&claims),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("item_id or batch_number"));
    }
}
