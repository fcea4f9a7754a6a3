// src/supplier_handlers.rs - Supplier CRUD

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{get_current_user, resolve_owner_id};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CreateSupplierRequest, Supplier, UpdateSupplierRequest};
use crate::AppState;

pub async fn get_suppliers(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let suppliers: Vec<Supplier> =
        sqlx::query_as("SELECT * FROM suppliers WHERE user_id = ? ORDER BY name")
            .bind(&owner_id)
            .fetch_all(&app_state.db_pool)
            .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(suppliers)))
}

pub async fn get_supplier(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let supplier_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let supplier: Supplier =
        sqlx::query_as("SELECT * FROM suppliers WHERE id = ? AND user_id = ?")
            .bind(&supplier_id)
            .bind(&owner_id)
            .fetch_optional(&app_state.db_pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Supplier"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(supplier)))
}

pub async fn create_supplier(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateSupplierRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;
    let now = Utc::now();

    let supplier = Supplier {
        id: Uuid::new_v4().to_string(),
        user_id: owner_id,
        name: request.name.clone(),
        company_name: request.company_name.clone(),
        contact_name: request.contact_name.clone(),
        phone: request.phone.clone(),
        email: request.email.clone(),
        address: request.address.clone(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"INSERT INTO suppliers (
            id, user_id, name, company_name, contact_name, phone, email, address,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&supplier.id)
    .bind(&supplier.user_id)
    .bind(&supplier.name)
    .bind(&supplier.company_name)
    .bind(&supplier.contact_name)
    .bind(&supplier.phone)
    .bind(&supplier.email)
    .bind(&supplier.address)
    .bind(supplier.created_at)
    .bind(supplier.updated_at)
    .execute(&app_state.db_pool)
    .await?;

    log::info!("Supplier {} created by {}", supplier.name, claims.username);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        supplier,
        "Supplier created successfully".to_string(),
    )))
}

pub async fn update_supplier(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateSupplierRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let supplier_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let existing: Supplier =
        sqlx::query_as("SELECT * FROM suppliers WHERE id = ? AND user_id = ?")
            .bind(&supplier_id)
            .bind(&owner_id)
            .fetch_optional(&app_state.db_pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Supplier"))?;

    let updated = Supplier {
        name: request.name.clone().unwrap_or(existing.name),
        company_name: request.company_name.clone().or(existing.company_name),
        contact_name: request.contact_name.clone().or(existing.contact_name),
        phone: request.phone.clone().or(existing.phone),
        email: request.email.clone().or(existing.email),
        address: request.address.clone().or(existing.address),
        updated_at: Utc::now(),
        ..existing
    };

    sqlx::query(
        r#"UPDATE suppliers SET
            name = ?, company_name = ?, contact_name = ?, phone = ?, email = ?,
            address = ?, updated_at = ?
        WHERE id = ? AND user_id = ?"#,
    )
    .bind(&updated.name)
    .bind(&updated.company_name)
    .bind(&updated.contact_name)
    .bind(&updated.phone)
    .bind(&updated.email)
    .bind(&updated.address)
    .bind(updated.updated_at)
    .bind(&supplier_id)
    .bind(&owner_id)
    .execute(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        updated,
        "Supplier updated successfully".to_string(),
    )))
}

pub async fn delete_supplier(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let supplier_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let in_use: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM purchase_orders WHERE supplier_id = ? AND user_id = ?",
    )
    .bind(&supplier_id)
    .bind(&owner_id)
    .fetch_one(&app_state.db_pool)
    .await?;
    if in_use.0 > 0 {
        return Err(ApiError::BadRequest(
            "Supplier is referenced by purchase orders and cannot be deleted".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM suppliers WHERE id = ? AND user_id = ?")
        .bind(&supplier_id)
        .bind(&owner_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Supplier"));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Supplier deleted successfully".to_string(),
    )))
}
