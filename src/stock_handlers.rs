// src/stock_handlers.rs - Aggregate stock endpoints
//
// A stock row is the per-warehouse aggregate over its lots. Quantities move
// through purchase orders and QC; direct edits are only allowed for goods
// sourced from the in-house "other" supplier.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{get_current_user, resolve_owner_id, Claims};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::status::{self, stock_status_for};
use crate::models::{ReturnStockRequest, Stock, StockLot, StockWithExpiry, UpdateStockRequest};
use crate::AppState;

/// Days before expiry at which a lot counts as near-expired.
pub const NEAR_EXPIRY_DAYS: i64 = 10;

/// Supplier names that mark in-house stock whose quantity may be edited
/// directly.
const OTHER_SUPPLIER_NAMES: [&str; 3] = ["อื่นๆ", "อื่น ๆ", "other"];

pub fn is_other_supplier(name: &str) -> bool {
    let trimmed = name.trim();
    OTHER_SUPPLIER_NAMES
        .iter()
        .any(|candidate| trimmed.eq_ignore_ascii_case(candidate))
}

/// Classify a stock's expiry situation from its active lots.
/// Returns (status, nearest expiry, near-expiry count, expired count).
pub fn classify_expiry(
    now: DateTime<Utc>,
    expiry_dates: &[Option<DateTime<Utc>>],
) -> (&'static str, Option<DateTime<Utc>>, i64, i64) {
    let dated: Vec<DateTime<Utc>> = expiry_dates.iter().filter_map(|d| *d).collect();
    if dated.is_empty() {
        return (status::expiry::NORMAL, None, 0, 0);
    }

    let near_cutoff = now + Duration::days(NEAR_EXPIRY_DAYS);
    let expired = dated.iter().filter(|d| **d <= now).count() as i64;
    let near = dated
        .iter()
        .filter(|d| **d > now && **d <= near_cutoff)
        .count() as i64;
    let total = dated.len() as i64;
    let nearest = dated.iter().min().copied();

    let label = if expired >= total {
        status::expiry::ALL_EXPIRED
    } else if expired > 0 {
        status::expiry::SOME_EXPIRED
    } else if near >= total {
        status::expiry::ALL_NEAR
    } else if near > 0 {
        status::expiry::SOME_NEAR
    } else {
        status::expiry::NORMAL
    };

    (label, nearest, near, expired)
}

/// Recompute a stock's total from its active lots and refresh its status.
pub async fn recompute_stock_total(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    stock_id: &str,
) -> ApiResult<i64> {
    let total: (Option<i64>,) = sqlx::query_as(
        "SELECT SUM(remaining_qty) FROM stock_lots WHERE stock_id = ? AND is_active = 1",
    )
    .bind(stock_id)
    .fetch_one(&mut **tx)
    .await?;
    let total = total.0.unwrap_or(0);

    let threshold: (i64,) = sqlx::query_as("SELECT threshold FROM stocks WHERE id = ?")
        .bind(stock_id)
        .fetch_one(&mut **tx)
        .await?;

    sqlx::query("UPDATE stocks SET total_quantity = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(total)
        .bind(stock_status_for(total, threshold.0))
        .bind(Utc::now())
        .bind(stock_id)
        .execute(&mut **tx)
        .await?;

    Ok(total)
}

async fn decorate_with_lots(
    pool: &sqlx::SqlitePool,
    stock: Stock,
) -> ApiResult<StockWithExpiry> {
    let lots: Vec<StockLot> = sqlx::query_as(
        "SELECT * FROM stock_lots WHERE stock_id = ? AND is_active = 1 ORDER BY expiry_date",
    )
    .bind(&stock.id)
    .fetch_all(pool)
    .await?;

    let expiry_dates: Vec<Option<DateTime<Utc>>> = lots.iter().map(|l| l.expiry_date).collect();
    let (expiry_status, nearest, near, expired) = classify_expiry(Utc::now(), &expiry_dates);

    Ok(StockWithExpiry {
        stock,
        expiry_status: expiry_status.to_string(),
        nearest_expiry_date: nearest,
        near_expiry_lots: near,
        expired_lots: expired,
        lots,
    })
}

async fn find_stock_by_barcode(
    pool: &sqlx::SqlitePool,
    owner_id: &str,
    barcode: &str,
) -> ApiResult<Stock> {
    sqlx::query_as("SELECT * FROM stocks WHERE barcode = ? AND user_id = ?")
        .bind(barcode)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::stock_not_found(barcode))
}

fn owner_of(http_request: &HttpRequest) -> ApiResult<(Claims, String)> {
    let claims = get_current_user(http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    Ok((claims, owner_id))
}

// ==================== HANDLERS ====================

pub async fn get_stocks(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let (_, owner_id) = owner_of(&http_request)?;

    let stocks: Vec<Stock> =
        sqlx::query_as("SELECT * FROM stocks WHERE user_id = ? ORDER BY updated_at DESC")
            .bind(&owner_id)
            .fetch_all(&app_state.db_pool)
            .await?;

    let mut decorated = Vec::with_capacity(stocks.len());
    for stock in stocks {
        decorated.push(decorate_with_lots(&app_state.db_pool, stock).await?);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(decorated)))
}

pub async fn get_stocks_by_product(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let product_id = path.into_inner();
    let (_, owner_id) = owner_of(&http_request)?;

    let stocks: Vec<Stock> = sqlx::query_as(
        "SELECT * FROM stocks WHERE product_id = ? AND user_id = ? ORDER BY location",
    )
    .bind(&product_id)
    .bind(&owner_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    if stocks.is_empty() {
        return Err(ApiError::not_found("Stock"));
    }

    let mut decorated = Vec::with_capacity(stocks.len());
    for stock in stocks {
        decorated.push(decorate_with_lots(&app_state.db_pool, stock).await?);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(decorated)))
}

pub async fn get_stock_by_barcode(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let barcode = path.into_inner();
    let (_, owner_id) = owner_of(&http_request)?;

    let stock = find_stock_by_barcode(&app_state.db_pool, &owner_id, &barcode).await?;
    let decorated = decorate_with_lots(&app_state.db_pool, stock).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(decorated)))
}

pub async fn update_stock_by_barcode(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateStockRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let barcode = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;

    let stock = find_stock_by_barcode(&app_state.db_pool, &owner_id, &barcode).await?;

    let mut tx = app_state.db_pool.begin().await?;
    let now = Utc::now();

    let threshold = request.threshold.unwrap_or(stock.threshold);
    let location = request.location.clone().unwrap_or_else(|| stock.location.clone());
    let mut total_quantity = stock.total_quantity;

    if let Some(new_quantity) = request.total_quantity {
        let supplier_name = stock.supplier_name.as_deref().unwrap_or("");
        if !is_other_supplier(supplier_name) {
            return Err(ApiError::BadRequest(
                "Quantity can only be edited for stock from the in-house supplier".to_string(),
            ));
        }

        let diff = new_quantity - stock.total_quantity;
        if diff != 0 {
            sqlx::query(
                r#"INSERT INTO stock_transactions (
                    id, user_id, stock_id, product_id, transaction_type, quantity,
                    reference_id, location, notes, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&owner_id)
            .bind(&stock.id)
            .bind(&stock.product_id)
            .bind(status::txn::ADJUSTMENT)
            .bind(diff)
            .bind(&stock.id)
            .bind(&location)
            .bind(&request.notes)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            // Keep the most recent active lot in step with the manual edit
            let latest_lot: Option<(String,)> = sqlx::query_as(
                r#"SELECT id FROM stock_lots
                   WHERE stock_id = ? AND is_active = 1
                   ORDER BY created_at DESC LIMIT 1"#,
            )
            .bind(&stock.id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((lot_id,)) = latest_lot {
                sqlx::query(
                    r#"UPDATE stock_lots
                       SET remaining_qty = MAX(0, remaining_qty + ?),
                           quantity = MAX(0, quantity + ?),
                           updated_at = ?
                       WHERE id = ?"#,
                )
                .bind(diff)
                .bind(diff)
                .bind(now)
                .bind(&lot_id)
                .execute(&mut *tx)
                .await?;
            }
        }
        total_quantity = new_quantity;
    }

    sqlx::query(
        r#"UPDATE stocks SET total_quantity = ?, threshold = ?, location = ?,
           status = ?, updated_at = ? WHERE id = ?"#,
    )
    .bind(total_quantity)
    .bind(threshold)
    .bind(&location)
    .bind(stock_status_for(total_quantity, threshold))
    .bind(now)
    .bind(&stock.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!("Stock {} updated by {}", barcode, claims.username);

    let stock = find_stock_by_barcode(&app_state.db_pool, &owner_id, &barcode).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        stock,
        "Stock updated successfully".to_string(),
    )))
}

pub async fn return_stock_by_barcode(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<ReturnStockRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let barcode = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;

    let stock = find_stock_by_barcode(&app_state.db_pool, &owner_id, &barcode).await?;

    let mut tx = app_state.db_pool.begin().await?;
    let now = Utc::now();
    let new_total = stock.total_quantity + request.quantity;

    sqlx::query(
        r#"INSERT INTO stock_transactions (
            id, user_id, stock_id, product_id, transaction_type, quantity,
            reference_id, location, notes, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&owner_id)
    .bind(&stock.id)
    .bind(&stock.product_id)
    .bind(status::txn::RETURN)
    .bind(request.quantity)
    .bind(&stock.id)
    .bind(&stock.location)
    .bind(&request.reason)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // Returned goods go back onto the most recent active lot
    let latest_lot: Option<(String,)> = sqlx::query_as(
        r#"SELECT id FROM stock_lots
           WHERE stock_id = ? AND is_active = 1
           ORDER BY created_at DESC LIMIT 1"#,
    )
    .bind(&stock.id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some((lot_id,)) = latest_lot {
        sqlx::query(
            "UPDATE stock_lots SET remaining_qty = remaining_qty + ?, updated_at = ? WHERE id = ?",
        )
        .bind(request.quantity)
        .bind(now)
        .bind(&lot_id)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "UPDATE stocks SET total_quantity = ?, status = ?, updated_at = ? WHERE id = ?",
    )
    .bind(new_total)
    .bind(stock_status_for(new_total, stock.threshold))
    .bind(now)
    .bind(&stock.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    log::info!(
        "Customer return of {} x{} processed by {}",
        barcode,
        request.quantity,
        claims.username
    );

    let stock = find_stock_by_barcode(&app_state.db_pool, &owner_id, &barcode).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        stock,
        "Stock return processed successfully".to_string(),
    )))
}

pub async fn delete_stock_by_barcode(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let barcode = path.into_inner();
    let (claims, owner_id) = owner_of(&http_request)?;

    let stock = find_stock_by_barcode(&app_state.db_pool, &owner_id, &barcode).await?;

    let mut tx = app_state.db_pool.begin().await?;

    sqlx::query("DELETE FROM stock_lots WHERE stock_id = ?")
        .bind(&stock.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM stocks WHERE id = ?")
        .bind(&stock.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM products WHERE barcode = ? AND user_id = ?")
        .bind(&barcode)
        .bind(&owner_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    log::info!("Stock {} deleted by {}", barcode, claims.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Stock deleted successfully".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: i64) -> Option<DateTime<Utc>> {
        Some(Utc::now() + Duration::days(n))
    }

    #[test]
    fn test_classify_expiry_no_dates() {
        let (label, nearest, near, expired) = classify_expiry(Utc::now(), &[None, None]);
        assert_eq!(label, status::expiry::NORMAL);
        assert!(nearest.is_none());
        assert_eq!((near, expired), (0, 0));
    }

    #[test]
    fn test_classify_expiry_mixed() {
        let now = Utc::now();
        let (label, _, near, expired) = classify_expiry(now, &[days(2), days(60)]);
        assert_eq!(label, status::expiry::SOME_NEAR);
        assert_eq!((near, expired), (1, 0));

        let (label, _, _, expired) = classify_expiry(now, &[days(-1), days(60)]);
        assert_eq!(label, status::expiry::SOME_EXPIRED);
        assert_eq!(expired, 1);

        let (label, _, _, _) = classify_expiry(now, &[days(-1), days(-5)]);
        assert_eq!(label, status::expiry::ALL_EXPIRED);

        let (label, _, _, _) = classify_expiry(now, &[days(3), days(9)]);
        assert_eq!(label, status::expiry::ALL_NEAR);
    }

    #[test]
    fn test_classify_expiry_nearest_date() {
        let now = Utc::now();
        let soon = days(2);
        let later = days(30);
        let (_, nearest, _, _) = classify_expiry(now, &[later, soon]);
        assert_eq!(nearest, soon);
    }

    #[test]
    fn test_is_other_supplier() {
        assert!(is_other_supplier("อื่นๆ"));
        assert!(is_other_supplier("อื่น ๆ"));
        assert!(is_other_supplier("Other"));
        assert!(is_other_supplier(" other "));
        assert!(!is_other_supplier("บริษัท สยามค้าส่ง"));
        assert!(!is_other_supplier(""));
    }
}
