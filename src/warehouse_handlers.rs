// src/warehouse_handlers.rs - Warehouse CRUD

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{get_current_user, resolve_owner_id};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CreateWarehouseRequest, UpdateWarehouseRequest, Warehouse};
use crate::AppState;

pub async fn get_warehouses(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let warehouses: Vec<Warehouse> =
        sqlx::query_as("SELECT * FROM warehouses WHERE user_id = ? ORDER BY name")
            .bind(&owner_id)
            .fetch_all(&app_state.db_pool)
            .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(warehouses)))
}

pub async fn get_warehouse(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let warehouse_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let warehouse: Warehouse =
        sqlx::query_as("SELECT * FROM warehouses WHERE id = ? AND user_id = ?")
            .bind(&warehouse_id)
            .bind(&owner_id)
            .fetch_optional(&app_state.db_pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Warehouse"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(warehouse)))
}

pub async fn create_warehouse(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateWarehouseRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    let now = Utc::now();

    let warehouse = Warehouse {
        id: Uuid::new_v4().to_string(),
        user_id: owner_id,
        name: request.name.clone(),
        location: request.location.clone(),
        description: request.description.clone(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"INSERT INTO warehouses (id, user_id, name, location, description, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&warehouse.id)
    .bind(&warehouse.user_id)
    .bind(&warehouse.name)
    .bind(&warehouse.location)
    .bind(&warehouse.description)
    .bind(warehouse.created_at)
    .bind(warehouse.updated_at)
    .execute(&app_state.db_pool)
    .await?;

    log::info!("Warehouse {} created by {}", warehouse.name, claims.username);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        warehouse,
        "Warehouse created successfully".to_string(),
    )))
}

pub async fn update_warehouse(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateWarehouseRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let warehouse_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let existing: Warehouse =
        sqlx::query_as("SELECT * FROM warehouses WHERE id = ? AND user_id = ?")
            .bind(&warehouse_id)
            .bind(&owner_id)
            .fetch_optional(&app_state.db_pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Warehouse"))?;

    let updated = Warehouse {
        name: request.name.clone().unwrap_or(existing.name),
        location: request.location.clone().or(existing.location),
        description: request.description.clone().or(existing.description),
        updated_at: Utc::now(),
        ..existing
    };

    sqlx::query(
        r#"UPDATE warehouses SET name = ?, location = ?, description = ?, updated_at = ?
           WHERE id = ? AND user_id = ?"#,
    )
    .bind(&updated.name)
    .bind(&updated.location)
    .bind(&updated.description)
    .bind(updated.updated_at)
    .bind(&warehouse_id)
    .bind(&owner_id)
    .execute(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        updated,
        "Warehouse updated successfully".to_string(),
    )))
}

pub async fn delete_warehouse(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let warehouse_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let in_use: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM stocks WHERE location = ? AND user_id = ?")
            .bind(&warehouse_id)
            .bind(&owner_id)
            .fetch_one(&app_state.db_pool)
            .await?;
    if in_use.0 > 0 {
        return Err(ApiError::BadRequest(
            "Warehouse holds stock and cannot be deleted".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM warehouses WHERE id = ? AND user_id = ?")
        .bind(&warehouse_id)
        .bind(&owner_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Warehouse"));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Warehouse deleted successfully".to_string(),
    )))
}
