// src/receipt_handlers.rs - Receipt listing, lookup, summaries and deletion
//
// Receipts are written by the sales flow and read-mostly here. The line items
// live in a JSON text column and are decoded on the way out.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Datelike, Duration, TimeZone, Utc};
use std::sync::Arc;

use crate::auth::{get_current_user, resolve_owner_id};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{
    Receipt, ReceiptDetail, ReceiptPeriodSummary, ReceiptSummary, ReceiptWindowEntry,
};
use crate::AppState;

#[derive(Debug, sqlx::FromRow)]
struct ReceiptRow {
    id: String,
    user_id: String,
    payment_id: String,
    employee_name: Option<String>,
    items: String,
    total_price: f64,
    amount_paid: f64,
    change_amount: f64,
    created_at: chrono::DateTime<Utc>,
    payment_method: String,
    payment_status: String,
}

impl ReceiptRow {
    fn into_detail(self) -> ReceiptDetail {
        let receipt = Receipt {
            id: self.id,
            user_id: self.user_id,
            payment_id: self.payment_id,
            employee_name: self.employee_name,
            items: self.items,
            total_price: self.total_price,
            amount_paid: self.amount_paid,
            change_amount: self.change_amount,
            created_at: self.created_at,
        };
        ReceiptDetail::from_parts(receipt, self.payment_method, self.payment_status)
    }
}

const RECEIPT_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.payment_id, r.employee_name, r.items,
           r.total_price, r.amount_paid, r.change_amount, r.created_at,
           p.payment_method, p.status AS payment_status
    FROM receipts r
    JOIN payments p ON p.id = r.payment_id
"#;

pub async fn get_receipts(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let sql = format!("{} WHERE r.user_id = ? ORDER BY r.created_at DESC", RECEIPT_SELECT);
    let rows: Vec<ReceiptRow> = sqlx::query_as(&sql)
        .bind(&owner_id)
        .fetch_all(&app_state.db_pool)
        .await?;

    let details: Vec<ReceiptDetail> = rows.into_iter().map(ReceiptRow::into_detail).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(details)))
}

pub async fn get_receipt_by_payment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let payment_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let sql = format!("{} WHERE r.payment_id = ? AND r.user_id = ?", RECEIPT_SELECT);
    let row: Option<ReceiptRow> = sqlx::query_as(&sql)
        .bind(&payment_id)
        .bind(&owner_id)
        .fetch_optional(&app_state.db_pool)
        .await?;

    let row = row.ok_or_else(|| ApiError::not_found("Receipt"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(row.into_detail())))
}

async fn summarize_since(
    pool: &sqlx::SqlitePool,
    owner_id: &str,
    since: chrono::DateTime<Utc>,
) -> ApiResult<ReceiptPeriodSummary> {
    let row: (i64, Option<f64>, Option<f64>, Option<f64>) = sqlx::query_as(
        r#"SELECT COUNT(*),
                  SUM(total_price),
                  SUM(amount_paid),
                  SUM(change_amount)
           FROM receipts
           WHERE user_id = ? AND created_at >= ?"#,
    )
    .bind(owner_id)
    .bind(since)
    .fetch_one(pool)
    .await?;

    let entries: Vec<(Option<String>, String, f64, chrono::DateTime<Utc>)> = sqlx::query_as(
        r#"SELECT employee_name, items, total_price, created_at
           FROM receipts
           WHERE user_id = ? AND created_at >= ?
           ORDER BY created_at DESC"#,
    )
    .bind(owner_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    let details = entries
        .into_iter()
        .map(|(employee_name, items, total_price, created_at)| ReceiptWindowEntry {
            employee_name,
            items: serde_json::from_str(&items).unwrap_or_default(),
            total_price,
            created_at,
        })
        .collect();

    Ok(ReceiptPeriodSummary {
        receipt_count: row.0,
        total_price: row.1.unwrap_or(0.0),
        amount_paid: row.2.unwrap_or(0.0),
        change_amount: row.3.unwrap_or(0.0),
        details,
    })
}

/// Start of today, of the current Sunday-based week and of the current month.
fn period_starts(
    now: chrono::DateTime<Utc>,
) -> (
    chrono::DateTime<Utc>,
    chrono::DateTime<Utc>,
    chrono::DateTime<Utc>,
) {
    let today = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);
    let week_start = today - Duration::days(now.weekday().num_days_from_sunday() as i64);
    let month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(today);
    (today, week_start, month_start)
}

pub async fn get_receipt_summary(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    let pool = &app_state.db_pool;

    let (today, week_start, month_start) = period_starts(Utc::now());

    let summary = ReceiptSummary {
        today: summarize_since(pool, &owner_id, today).await?,
        this_week: summarize_since(pool, &owner_id, week_start).await?,
        this_month: summarize_since(pool, &owner_id, month_start).await?,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(summary)))
}

pub async fn delete_receipt(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let payment_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let result = sqlx::query("DELETE FROM receipts WHERE payment_id = ? AND user_id = ?")
        .bind(&payment_id)
        .bind(&owner_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Receipt"));
    }

    log::info!(
        "Receipt for payment {} deleted by {}",
        payment_id,
        claims.username
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Receipt deleted successfully".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_state, request_with, seed_owner, test_pool};
    use uuid::Uuid;

    async fn seed_sale(pool: &sqlx::SqlitePool, owner_id: &str, payment_id: &str, total: f64) {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO payments (id, user_id, payment_method, amount, status, employee_name, created_at)
               VALUES (?, ?, 'cash', ?, 'completed', 'cashier', ?)"#,
        )
        .bind(payment_id)
        .bind(owner_id)
        .bind(total)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();

        sqlx::query(
            r#"INSERT INTO receipts (id, user_id, payment_id, employee_name, items, total_price, amount_paid, change_amount, created_at)
               VALUES (?, ?, ?, 'cashier', ?, ?, ?, 0, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(owner_id)
        .bind(payment_id)
        .bind(r#"[{"name":"นมสด","quantity":2,"subtotal":50.0}]"#)
        .bind(total)
        .bind(total)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_summary_window_carries_receipt_details() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        seed_sale(&pool, &claims.sub, "pay-1", 50.0).await;

        let epoch = Utc.timestamp_opt(0, 0).single().unwrap();
        let window = summarize_since(&pool, &claims.sub, epoch).await.unwrap();

        assert_eq!(window.receipt_count, 1);
        assert_eq!(window.total_price, 50.0);
        assert_eq!(window.details.len(), 1);
        assert_eq!(window.details[0].employee_name.as_deref(), Some("cashier"));
        assert_eq!(window.details[0].items.len(), 1);
        assert_eq!(window.details[0].items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_delete_receipt_is_keyed_on_payment_id() {
        let pool = test_pool().await;
        let claims = seed_owner(&pool).await;
        seed_sale(&pool, &claims.sub, "pay-7", 120.0).await;
        let state = app_state(pool);

        delete_receipt(
            state.clone(),
            web::Path::from("pay-7".to_string()),
            request_with(&claims),
        )
        .await
        .unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM receipts")
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        let result = delete_receipt(
            state.clone(),
            web::Path::from("pay-7".to_string()),
            request_with(&claims),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_week_window_starts_on_sunday() {
        // 2025-06-11 is a Wednesday
        let now = Utc.with_ymd_and_hms(2025, 6, 11, 15, 30, 0).single().unwrap();
        let (today, week_start, month_start) = period_starts(now);
        assert_eq!(
            today,
            Utc.with_ymd_and_hms(2025, 6, 11, 0, 0, 0).single().unwrap()
        );
        assert_eq!(
            week_start,
            Utc.with_ymd_and_hms(2025, 6, 8, 0, 0, 0).single().unwrap()
        );
        assert_eq!(
            month_start,
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().unwrap()
        );
    }
}
