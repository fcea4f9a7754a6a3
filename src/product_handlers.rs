// src/product_handlers.rs - Product catalog CRUD

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{get_current_user, resolve_owner_id};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CreateProductRequest, Product, UpdateProductRequest};
use crate::AppState;

async fn find_product(
    pool: &sqlx::SqlitePool,
    owner_id: &str,
    product_id: &str,
) -> ApiResult<Product> {
    sqlx::query_as("SELECT * FROM products WHERE id = ? AND user_id = ?")
        .bind(product_id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Product"))
}

pub async fn get_products(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let products: Vec<Product> =
        sqlx::query_as("SELECT * FROM products WHERE user_id = ? ORDER BY name")
            .bind(&owner_id)
            .fetch_all(&app_state.db_pool)
            .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(products)))
}

pub async fn get_product(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let product_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let product = find_product(&app_state.db_pool, &owner_id, &product_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(product)))
}

pub async fn create_product(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateProductRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    let pool = &app_state.db_pool;

    let duplicate: Option<(String,)> =
        sqlx::query_as("SELECT id FROM products WHERE barcode = ? AND user_id = ?")
            .bind(&request.barcode)
            .bind(&owner_id)
            .fetch_optional(pool)
            .await?;
    if duplicate.is_some() {
        return Err(ApiError::BadRequest(format!(
            "Product with barcode '{}' already exists",
            request.barcode
        )));
    }

    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        user_id: owner_id,
        name: request.name.clone(),
        barcode: request.barcode.clone(),
        category: request.category.clone(),
        unit: request.unit.clone(),
        price: request.price,
        description: request.description.clone(),
        image_url: request.image_url.clone(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"INSERT INTO products (
            id, user_id, name, barcode, category, unit, price,
            description, image_url, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&product.id)
    .bind(&product.user_id)
    .bind(&product.name)
    .bind(&product.barcode)
    .bind(&product.category)
    .bind(&product.unit)
    .bind(product.price)
    .bind(&product.description)
    .bind(&product.image_url)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(pool)
    .await?;

    log::info!("Product '{}' created by {}", product.name, claims.username);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        product,
        "Product created successfully".to_string(),
    )))
}

pub async fn update_product(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateProductRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let product_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    let pool = &app_state.db_pool;

    let existing = find_product(pool, &owner_id, &product_id).await?;

    let updated = Product {
        name: request.name.clone().unwrap_or(existing.name.clone()),
        category: request.category.clone().or_else(|| existing.category.clone()),
        unit: request.unit.clone().or_else(|| existing.unit.clone()),
        price: request.price.unwrap_or(existing.price),
        description: request
            .description
            .clone()
            .or_else(|| existing.description.clone()),
        image_url: request
            .image_url
            .clone()
            .or_else(|| existing.image_url.clone()),
        updated_at: Utc::now(),
        ..existing
    };

    sqlx::query(
        r#"UPDATE products
           SET name = ?, category = ?, unit = ?, price = ?,
               description = ?, image_url = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&updated.name)
    .bind(&updated.category)
    .bind(&updated.unit)
    .bind(updated.price)
    .bind(&updated.description)
    .bind(&updated.image_url)
    .bind(updated.updated_at)
    .bind(&updated.id)
    .execute(pool)
    .await?;

    // Keep denormalized stock copies in sync with the catalog name
    sqlx::query("UPDATE stocks SET product_name = ?, updated_at = ? WHERE product_id = ?")
        .bind(&updated.name)
        .bind(updated.updated_at)
        .bind(&updated.id)
        .execute(pool)
        .await?;

    log::info!("Product '{}' updated by {}", updated.name, claims.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        updated,
        "Product updated successfully".to_string(),
    )))
}

pub async fn delete_product(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let product_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    let pool = &app_state.db_pool;

    let product = find_product(pool, &owner_id, &product_id).await?;

    let referenced: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM stocks WHERE product_id = ? AND user_id = ?")
            .bind(&product.id)
            .bind(&owner_id)
            .fetch_one(pool)
            .await?;
    if referenced.0 > 0 {
        return Err(ApiError::BadRequest(
            "Cannot delete product: stock records exist for it".to_string(),
        ));
    }

    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&product.id)
        .execute(pool)
        .await?;

    log::info!("Product '{}' deleted by {}", product.name, claims.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Product deleted successfully".to_string(),
    )))
}
