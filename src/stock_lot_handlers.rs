// src/stock_lot_handlers.rs - Stock lot endpoints

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::auth::{get_current_user, resolve_owner_id};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::status;
use crate::models::{
    CloseLotRequest, LotFilterQuery, LotsByBarcode, StockLot, UpdateLotExpiryRequest,
    UpdateLotQcRequest,
};
use crate::AppState;

async fn find_lot(
    pool: &sqlx::SqlitePool,
    owner_id: &str,
    lot_id: &str,
) -> ApiResult<StockLot> {
    sqlx::query_as("SELECT * FROM stock_lots WHERE id = ? AND user_id = ?")
        .bind(lot_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Stock lot"))
}

pub async fn get_stock_lots(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let lots: Vec<StockLot> =
        sqlx::query_as("SELECT * FROM stock_lots WHERE user_id = ? ORDER BY updated_at DESC")
            .bind(&owner_id)
            .fetch_all(&app_state.db_pool)
            .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(lots)))
}

pub async fn filter_stock_lots(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LotFilterQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let mut sql = String::from("SELECT * FROM stock_lots WHERE user_id = ?");
    if query.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if query.qc_status.is_some() {
        sql.push_str(" AND qc_status = ?");
    }
    if query.warehouse_id.is_some() {
        sql.push_str(" AND location = ?");
    }
    if query.supplier_id.is_some() {
        sql.push_str(" AND supplier_id = ?");
    }
    sql.push_str(" ORDER BY updated_at DESC");

    let mut q = sqlx::query_as::<_, StockLot>(&sql).bind(&owner_id);
    if let Some(ref status) = query.status {
        q = q.bind(status);
    }
    if let Some(ref qc_status) = query.qc_status {
        q = q.bind(qc_status);
    }
    if let Some(ref warehouse_id) = query.warehouse_id {
        q = q.bind(warehouse_id);
    }
    if let Some(ref supplier_id) = query.supplier_id {
        q = q.bind(supplier_id);
    }

    let lots = q.fetch_all(&app_state.db_pool).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(lots)))
}

pub async fn get_stock_lots_by_barcode(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let barcode = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let lots: Vec<StockLot> = sqlx::query_as(
        "SELECT * FROM stock_lots WHERE barcode = ? AND user_id = ? ORDER BY created_at DESC",
    )
    .bind(&barcode)
    .bind(&owner_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    let first = lots
        .first()
        .ok_or_else(|| ApiError::stock_lot_not_found(&barcode))?;

    let response = LotsByBarcode {
        product_id: first.product_id.clone(),
        product_name: first.product_name.clone(),
        barcode,
        total_quantity: lots
            .iter()
            .filter(|l| l.is_active)
            .map(|l| l.remaining_qty)
            .sum(),
        lots,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

pub async fn update_lot_expiry(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateLotExpiryRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let lot_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let lot = find_lot(&app_state.db_pool, &owner_id, &lot_id).await?;

    sqlx::query("UPDATE stock_lots SET expiry_date = ?, updated_at = ? WHERE id = ?")
        .bind(request.expiry_date)
        .bind(Utc::now())
        .bind(&lot.id)
        .execute(&app_state.db_pool)
        .await?;

    let lot = find_lot(&app_state.db_pool, &owner_id, &lot_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        lot,
        "Expiry date updated successfully".to_string(),
    )))
}

pub async fn update_lot_qc(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateLotQcRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let lot_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let lot = find_lot(&app_state.db_pool, &owner_id, &lot_id).await?;

    sqlx::query("UPDATE stock_lots SET qc_status = ?, reason = ?, updated_at = ? WHERE id = ?")
        .bind(&request.qc_status)
        .bind(&request.notes)
        .bind(Utc::now())
        .bind(&lot.id)
        .execute(&app_state.db_pool)
        .await?;

    log::info!(
        "Lot {} QC status set to {} by {}",
        lot.batch_number,
        request.qc_status,
        claims.username
    );

    let lot = find_lot(&app_state.db_pool, &owner_id, &lot_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        lot,
        "Lot QC status updated successfully".to_string(),
    )))
}

pub async fn close_lot(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<CloseLotRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let lot_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let lot = find_lot(&app_state.db_pool, &owner_id, &lot_id).await?;

    if !lot.is_active {
        return Err(ApiError::BadRequest(format!(
            "Lot '{}' is already closed",
            lot.batch_number
        )));
    }

    let final_status = request
        .status
        .clone()
        .unwrap_or_else(|| status::lot::DAMAGED.to_string());
    let now = Utc::now();

    let mut tx = app_state.db_pool.begin().await?;

    sqlx::query(
        r#"UPDATE stock_lots
           SET status = ?, reason = ?, is_active = 0, is_temporary = 1,
               closed_by = ?, closed_at = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&final_status)
    .bind(&request.reason)
    .bind(&claims.username)
    .bind(now)
    .bind(now)
    .bind(&lot.id)
    .execute(&mut *tx)
    .await?;

    crate::stock_handlers::recompute_stock_total(&mut tx, &lot.stock_id).await?;

    tx.commit().await?;

    log::info!(
        "Lot {} closed as {} by {}",
        lot.batch_number,
        final_status,
        claims.username
    );

    let lot = find_lot(&app_state.db_pool, &owner_id, &lot_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        lot,
        "Lot closed successfully".to_string(),
    )))
}
