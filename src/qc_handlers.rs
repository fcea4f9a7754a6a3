// src/qc_handlers.rs - Quality control records and PO-level QC resolution
//
// Creating or editing a QC record only syncs the lot's qc_status. Stock is
// touched in exactly one place: the PO-level resolution, where a RESTOCK
// transaction per lot guards against double intake.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{get_current_user, resolve_owner_id, Claims};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::status::{self, qc_status_from_counts};
use crate::models::{
    CreateQcRequest, PurchaseOrder, PurchaseOrderItem, QualityControl, QualityControlDetail,
    ResolvePoQcRequest, StockLot, UpdateQcRequest,
};
use crate::stock_handlers::recompute_stock_total;
use crate::AppState;

fn owner_of(http_request: &HttpRequest) -> ApiResult<(Claims, String)> {
    let claims = get_current_user(http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    Ok((claims, owner_id))
}

async fn find_lot_by_batch(
    pool: &sqlx::SqlitePool,
    owner_id: &str,
    batch_number: &str,
) -> ApiResult<StockLot> {
    sqlx::query_as("SELECT * FROM stock_lots WHERE batch_number = ? AND user_id = ?")
        .bind(batch_number)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::stock_lot_not_found(batch_number))
}

// ==================== RECORD CRUD ====================

pub async fn create_qc_record(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateQcRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    let lot = find_lot_by_batch(pool, &owner_id, &request.batch_number).await?;

    if let Some(product_id) = &request.product_id {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM products WHERE id = ? AND user_id = ?")
                .bind(product_id)
                .bind(&owner_id)
                .fetch_optional(pool)
                .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown product"));
        }
    }
    if let Some(supplier_id) = &request.supplier_id {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM suppliers WHERE id = ? AND user_id = ?")
                .bind(supplier_id)
                .bind(&owner_id)
                .fetch_optional(pool)
                .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown supplier"));
        }
    }
    if let Some(warehouse_id) = &request.warehouse_id {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM warehouses WHERE id = ? AND user_id = ?")
                .bind(warehouse_id)
                .bind(&owner_id)
                .fetch_optional(pool)
                .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown warehouse"));
        }
    }

    let record_status = request
        .status
        .clone()
        .unwrap_or_else(|| {
            qc_status_from_counts(request.total_quantity, request.failed_quantity).to_string()
        });

    let issues_json = match &request.issues {
        Some(issues) => Some(
            serde_json::to_string(issues)
                .map_err(|_| ApiError::bad_request("Invalid issues payload"))?,
        ),
        None => None,
    };
    let attachments_json = match &request.attachments {
        Some(attachments) => Some(
            serde_json::to_string(attachments)
                .map_err(|_| ApiError::bad_request("Invalid attachments payload"))?,
        ),
        None => None,
    };

    let now = Utc::now();
    let record = QualityControl {
        id: Uuid::new_v4().to_string(),
        user_id: owner_id.clone(),
        batch_number: request.batch_number.clone(),
        product_id: request.product_id.clone(),
        supplier_id: request.supplier_id.clone(),
        warehouse_id: request.warehouse_id.clone(),
        status: record_status.clone(),
        total_quantity: request.total_quantity,
        passed_quantity: request.passed_quantity,
        failed_quantity: request.failed_quantity,
        temperature: request.temperature,
        humidity: request.humidity,
        issues: issues_json,
        attachments: attachments_json,
        remarks: request.remarks.clone(),
        inspected_by: Some(claims.username.clone()),
        created_at: now,
        updated_at: now,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO quality_controls (
            id, user_id, batch_number, product_id, supplier_id, warehouse_id,
            status, total_quantity, passed_quantity, failed_quantity,
            temperature, humidity, issues, attachments, remarks, inspected_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&record.id)
    .bind(&record.user_id)
    .bind(&record.batch_number)
    .bind(&record.product_id)
    .bind(&record.supplier_id)
    .bind(&record.warehouse_id)
    .bind(&record.status)
    .bind(record.total_quantity)
    .bind(record.passed_quantity)
    .bind(record.failed_quantity)
    .bind(record.temperature)
    .bind(record.humidity)
    .bind(&record.issues)
    .bind(&record.attachments)
    .bind(&record.remarks)
    .bind(&record.inspected_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *tx)
    .await?;

    // Sync the lot's qc_status; the lot stays awaiting QC until the PO-level
    // resolution
    sqlx::query(
        "UPDATE stock_lots SET qc_status = ?, failed_quantity = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&record.status)
    .bind(record.failed_quantity)
    .bind(now)
    .bind(&lot.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "QC record for batch {} created by {} ({})",
        record.batch_number,
        claims.username,
        record.status
    );

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        QualityControlDetail::from_record(record),
        "QC record created successfully".to_string(),
    )))
}

pub async fn get_qc_records_by_batch(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let batch_number = path.into_inner();
    let (_, owner_id) = owner_of(&http_request)?;

    let records: Vec<QualityControl> = sqlx::query_as(
        r#"SELECT * FROM quality_controls
           WHERE batch_number = ? AND user_id = ?
           ORDER BY created_at DESC"#,
    )
    .bind(&batch_number)
    .bind(&owner_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    if records.is_empty() {
        return Err(ApiError::qc_record_not_found(&batch_number));
    }

    let details: Vec<QualityControlDetail> = records
        .into_iter()
        .map(QualityControlDetail::from_record)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(details)))
}

pub async fn update_qc_record(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateQcRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let record_id = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    let record: QualityControl =
        sqlx::query_as("SELECT * FROM quality_controls WHERE id = ? AND user_id = ?")
            .bind(&record_id)
            .bind(&owner_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("QC record"))?;

    let new_status = request.status.clone().unwrap_or_else(|| record.status.clone());
    let new_remarks = request.remarks.clone().or_else(|| record.remarks.clone());
    let new_issues = match &request.issues {
        Some(issues) => Some(
            serde_json::to_string(issues)
                .map_err(|_| ApiError::bad_request("Invalid issues payload"))?,
        ),
        None => record.issues.clone(),
    };
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"UPDATE quality_controls
           SET status = ?, remarks = ?, issues = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&new_status)
    .bind(&new_remarks)
    .bind(&new_issues)
    .bind(now)
    .bind(&record.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE stock_lots SET qc_status = ?, updated_at = ? WHERE batch_number = ? AND user_id = ?",
    )
    .bind(&new_status)
    .bind(now)
    .bind(&record.batch_number)
    .bind(&owner_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "QC record {} updated by {} ({})",
        record.id,
        claims.username,
        new_status
    );

    let record: QualityControl = sqlx::query_as("SELECT * FROM quality_controls WHERE id = ?")
        .bind(&record_id)
        .fetch_one(pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        QualityControlDetail::from_record(record),
        "QC record updated successfully".to_string(),
    )))
}

pub async fn delete_qc_record(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let record_id = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;

    // Deleting a record never rolls back lot or stock state
    let result = sqlx::query("DELETE FROM quality_controls WHERE id = ? AND user_id = ?")
        .bind(&record_id)
        .bind(&owner_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("QC record"));
    }

    log::info!("QC record {} deleted by {}", record_id, claims.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "QC record deleted successfully".to_string(),
    )))
}

// ==================== PO-LEVEL RESOLUTION ====================

pub async fn resolve_purchase_order_qc(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<ResolvePoQcRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let po_id = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;
    let pool = &app_state.db_pool;

    let order: PurchaseOrder =
        sqlx::query_as("SELECT * FROM purchase_orders WHERE id = ? AND user_id = ?")
            .bind(&po_id)
            .bind(&owner_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::purchase_order_not_found(&po_id))?;

    // Idempotency guard: a passed order is never processed twice
    if order.status == status::po::QC_PASSED {
        return Err(ApiError::BadRequest(
            "Purchase order has already passed QC".to_string(),
        ));
    }

    match request.qc_status.as_str() {
        s if s == status::qc::PASSED => pass_purchase_order(pool, &order, &claims).await,
        s if s == status::qc::FAILED => fail_purchase_order(pool, &order, &claims).await,
        other => Err(ApiError::BadRequest(format!(
            "Unsupported QC resolution '{}'",
            other
        ))),
    }
}

async fn pass_purchase_order(
    pool: &sqlx::SqlitePool,
    order: &PurchaseOrder,
    claims: &Claims,
) -> ApiResult<HttpResponse> {
    let items: Vec<PurchaseOrderItem> =
        sqlx::query_as("SELECT * FROM purchase_order_items WHERE purchase_order_id = ?")
            .bind(&order.id)
            .fetch_all(pool)
            .await?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for item in &items {
        let lot_id = match &item.stock_lot_id {
            Some(id) => id.clone(),
            None => continue,
        };

        sqlx::query(
            r#"UPDATE stock_lots
               SET status = ?, qc_status = ?, is_active = 1, is_temporary = 0,
                   quantity = ?, remaining_qty = ?, failed_quantity = 0,
                   last_restocked = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(status::lot::SELLABLE)
        .bind(status::qc::PASSED)
        .bind(item.quantity)
        .bind(item.quantity)
        .bind(now)
        .bind(now)
        .bind(&lot_id)
        .execute(&mut *tx)
        .await?;

        // A RESTOCK transaction per lot is the intake idempotency guard
        let already_restocked: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM stock_transactions WHERE stock_lot_id = ? AND transaction_type = ?",
        )
        .bind(&lot_id)
        .bind(status::txn::RESTOCK)
        .fetch_one(&mut *tx)
        .await?;

        let stock_id: Option<(String,)> =
            sqlx::query_as("SELECT stock_id FROM stock_lots WHERE id = ?")
                .bind(&lot_id)
                .fetch_optional(&mut *tx)
                .await?;
        let stock_id = match stock_id {
            Some((id,)) => id,
            None => continue,
        };

        if already_restocked.0 == 0 {
            sqlx::query(
                r#"INSERT INTO stock_transactions (
                    id, user_id, stock_id, stock_lot_id, product_id, transaction_type,
                    quantity, cost_price, reference_id, source, location, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&order.user_id)
            .bind(&stock_id)
            .bind(&lot_id)
            .bind(&item.product_id)
            .bind(status::txn::RESTOCK)
            .bind(item.quantity)
            .bind(item.cost_price)
            .bind(&order.id)
            .bind("purchase_order")
            .bind(&order.location)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE stocks SET last_restocked = ?, updated_at = ? WHERE id = ?",
            )
            .bind(now)
            .bind(now)
            .bind(&stock_id)
            .execute(&mut *tx)
            .await?;
        } else {
            log::warn!(
                "Lot {} already restocked, skipping stock intake",
                item.batch_number.as_deref().unwrap_or(&lot_id)
            );
        }

        // The authoritative total is always the sum over active lots
        recompute_stock_total(&mut tx, &stock_id).await?;
    }

    sqlx::query(
        r#"UPDATE purchase_orders
           SET status = ?, qc_status = ?, qc_checked_at = ?, updated_by = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(status::po::QC_PASSED)
    .bind(status::qc::PASSED)
    .bind(now)
    .bind(&claims.username)
    .bind(now)
    .bind(&order.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Purchase order {} passed QC ({} lots activated) by {}",
        order.purchase_order_number,
        items.len(),
        claims.username
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Purchase order passed QC, stock updated".to_string(),
    )))
}

async fn fail_purchase_order(
    pool: &sqlx::SqlitePool,
    order: &PurchaseOrder,
    claims: &Claims,
) -> ApiResult<HttpResponse> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"UPDATE stock_lots
           SET status = ?, qc_status = ?, is_active = 0, is_temporary = 1, updated_at = ?
           WHERE purchase_order_id = ? AND user_id = ?"#,
    )
    .bind(status::lot::AWAITING_DISPOSAL)
    .bind(status::qc::FAILED)
    .bind(now)
    .bind(&order.id)
    .bind(&order.user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"UPDATE purchase_orders
           SET status = ?, qc_status = ?, qc_checked_at = ?, updated_by = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(status::po::QC_FAILED_AWAITING_RETURN)
    .bind(status::qc::FAILED)
    .bind(now)
    .bind(&claims.username)
    .bind(now)
    .bind(&order.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Purchase order {} failed QC by {}",
        order.purchase_order_number,
        claims.username
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Purchase order failed QC, goods awaiting return".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        app_state, confirm_order, create_order, request_with, seed_catalog, seed_owner, test_pool,
    };

    async fn resolve(
        state: &web::Data<Arc<AppState>>,
        claims: &Claims,
        po_id: &str,
        qc_status: &str,
    ) -> ApiResult<HttpResponse> {
        resolve_purchase_order_qc(
            state.clone(),
            web::Path::from(po_id.to_string()),
            web::Json(ResolvePoQcRequest {
                qc_status: qc_status.to_string(),
            }),
            request_with(claims),
        )
        .await
    }

    async fn stock_total(state: &web::Data<Arc<AppState>>) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT total_quantity FROM stocks LIMIT 1")
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        row.0
    }

    async fn restock_count(state: &web::Data<Arc<AppState>>) -> i64 {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM stock_transactions WHERE transaction_type = ?",
        )
        .bind(status::txn::RESTOCK)
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_qc_pass_counts_goods_in_exactly_once() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        let (supplier_id, warehouse_id, product_id) = seed_catalog(&pool, &claims.sub).await;
        let state = app_state(pool);

        let po_id =
            create_order(&state, &claims, &supplier_id, &warehouse_id, &product_id, 10).await;
        confirm_order(&state, &claims, &po_id).await;

        resolve(&state, &claims, &po_id, status::qc::PASSED)
            .await
            .unwrap();
        assert_eq!(stock_total(&state).await, 10);
        assert_eq!(restock_count(&state).await, 1);

        // A passed order is rejected outright
        assert!(resolve(&state, &claims, &po_id, status::qc::PASSED)
            .await
            .is_err());

        // Replay with the status guard out of the way; the RESTOCK row
        // still blocks a second intake
        sqlx::query("UPDATE purchase_orders SET status = ? WHERE id = ?")
            .bind(status::po::RECEIVED)
            .bind(&po_id)
            .execute(&state.db_pool)
            .await
            .unwrap();
        resolve(&state, &claims, &po_id, status::qc::PASSED)
            .await
            .unwrap();

        assert_eq!(stock_total(&state).await, 10);
        assert_eq!(restock_count(&state).await, 1);
    }

    #[tokio::test]
    async fn test_qc_fail_parks_lots_without_stock_intake() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        let (supplier_id, warehouse_id, product_id) = seed_catalog(&pool, &claims.sub).await;
        let state = app_state(pool);

        let po_id =
            create_order(&state, &claims, &supplier_id, &warehouse_id, &product_id, 6).await;
        confirm_order(&state, &claims, &po_id).await;

        resolve(&state, &claims, &po_id, status::qc::FAILED)
            .await
            .unwrap();

        let (lot_status, order_status): (String, String) = {
            let lot: (String,) = sqlx::query_as("SELECT status FROM stock_lots LIMIT 1")
                .fetch_one(&state.db_pool)
                .await
                .unwrap();
            let order: (String,) =
                sqlx::query_as("SELECT status FROM purchase_orders WHERE id = ?")
                    .bind(&po_id)
                    .fetch_one(&state.db_pool)
                    .await
                    .unwrap();
            (lot.0, order.0)
        };
        assert_eq!(lot_status, status::lot::AWAITING_DISPOSAL);
        assert_eq!(order_status, status::po::QC_FAILED_AWAITING_RETURN);
        assert_eq!(stock_total(&state).await, 0);
        assert_eq!(restock_count(&state).await, 0);
    }
}
