// src/test_support.rs - Shared fixtures for handler tests

use actix_web::test::TestRequest;
use actix_web::{web, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{Claims, UserRole};
use crate::config::Config;
use crate::models::{CreatePurchaseOrderItem, CreatePurchaseOrderRequest};
use crate::watcher::StockWatcher;
use crate::AppState;

/// Single-connection pool so every query sees the same in-memory database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn seed_owner(pool: &SqlitePool) -> Claims {
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO users (id, username, email, password_hash, role, admin_id, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, 'admin', NULL, 1, ?, ?)"#,
    )
    .bind("owner-1")
    .bind("owner")
    .bind("owner@example.com")
    .bind("not-a-real-hash")
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    Claims {
        sub: "owner-1".to_string(),
        username: "owner".to_string(),
        role: UserRole::Admin,
        admin_id: None,
        exp: (now + Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    }
}

/// One supplier, warehouse and product, returned as (supplier, warehouse, product) ids.
pub async fn seed_catalog(pool: &SqlitePool, owner_id: &str) -> (String, String, String) {
    let now = Utc::now();

    let supplier_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO suppliers (id, user_id, name, created_at, updated_at) VALUES (?, ?, 'Fresh Farm', ?, ?)",
    )
    .bind(&supplier_id)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    let warehouse_id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO warehouses (id, user_id, name, created_at, updated_at) VALUES (?, ?, 'Main', ?, ?)",
    )
    .bind(&warehouse_id)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    let product_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO products (id, user_id, name, barcode, price, created_at, updated_at)
           VALUES (?, ?, 'Milk 1L', '8850001000017', 25.0, ?, ?)"#,
    )
    .bind(&product_id)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    (supplier_id, warehouse_id, product_id)
}

pub fn app_state(pool: SqlitePool) -> web::Data<Arc<AppState>> {
    web::Data::new(Arc::new(AppState {
        db_pool: pool,
        config: Config::default(),
        stock_watcher: StockWatcher::new(),
    }))
}

/// Request carrying the claims the jwt middleware would have inserted.
pub fn request_with(claims: &Claims) -> HttpRequest {
    let request = TestRequest::default().to_http_request();
    request.extensions_mut().insert(claims.clone());
    request
}

/// Create a pending one-item purchase order and return its id.
pub async fn create_order(
    state: &web::Data<Arc<AppState>>,
    claims: &Claims,
    supplier_id: &str,
    warehouse_id: &str,
    product_id: &str,
    quantity: i64,
) -> String {
    let request = CreatePurchaseOrderRequest {
        supplier_id: supplier_id.to_string(),
        warehouse_id: warehouse_id.to_string(),
        invoice_number: None,
        notes: None,
        items: vec![CreatePurchaseOrderItem {
            product_id: product_id.to_string(),
            quantity,
            cost_price: 12.5,
            sale_price: None,
            expiry_date: Some(Utc::now() + Duration::days(90)),
        }],
    };
    crate::po_handlers::create_purchase_order(
        state.clone(),
        web::Json(request),
        request_with(claims),
    )
    .await
    .unwrap();

    let row: (String,) =
        sqlx::query_as("SELECT id FROM purchase_orders ORDER BY rowid DESC LIMIT 1")
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
    row.0
}

pub async fn confirm_order(state: &web::Data<Arc<AppState>>, claims: &Claims, po_id: &str) {
    crate::po_handlers::confirm_purchase_order(
        state.clone(),
        web::Path::from(po_id.to_string()),
        request_with(claims),
    )
    .await
    .unwrap();
}
