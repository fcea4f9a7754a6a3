// src/handlers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{get_current_user, resolve_owner_id};
use crate::error::ApiResult;
use crate::models::DashboardStats;
use crate::AppState;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

// ==================== DASHBOARD ====================

pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    let pool = &app_state.db_pool;

    let total_products: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM products WHERE user_id = ?")
            .bind(&owner_id)
            .fetch_one(pool)
            .await?;

    let total_stocks: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stocks WHERE user_id = ?")
        .bind(&owner_id)
        .fetch_one(pool)
        .await?;

    let active_lots: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM stock_lots WHERE user_id = ? AND is_active = 1")
            .bind(&owner_id)
            .fetch_one(pool)
            .await?;

    let pending_pos: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM purchase_orders WHERE user_id = ? AND status = 'รอดำเนินการ'",
    )
    .bind(&owner_id)
    .fetch_one(pool)
    .await?;

    let awaiting_qc_pos: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM purchase_orders WHERE user_id = ? AND status = 'ได้รับสินค้าแล้ว'",
    )
    .bind(&owner_id)
    .fetch_one(pool)
    .await?;

    let low_stock: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM stocks WHERE user_id = ? AND total_quantity > 0 AND total_quantity <= threshold",
    )
    .bind(&owner_id)
    .fetch_one(pool)
    .await?;

    let out_of_stock: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM stocks WHERE user_id = ? AND total_quantity <= 0")
            .bind(&owner_id)
            .fetch_one(pool)
            .await?;

    let near_expiry: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM stock_lots
           WHERE user_id = ? AND is_active = 1 AND expiry_date IS NOT NULL
             AND expiry_date > datetime('now')
             AND expiry_date <= datetime('now', '+10 days')"#,
    )
    .bind(&owner_id)
    .fetch_one(pool)
    .await?;

    let expired: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM stock_lots
           WHERE user_id = ? AND is_active = 1 AND expiry_date IS NOT NULL
             AND expiry_date <= datetime('now')"#,
    )
    .bind(&owner_id)
    .fetch_one(pool)
    .await?;

    let stats = DashboardStats {
        total_products: total_products.0,
        total_stocks: total_stocks.0,
        active_lots: active_lots.0,
        pending_purchase_orders: pending_pos.0,
        awaiting_qc_purchase_orders: awaiting_qc_pos.0,
        low_stock_count: low_stock.0,
        out_of_stock_count: out_of_stock.0,
        near_expiry_lots: near_expiry.0,
        expired_lots: expired.0,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}
