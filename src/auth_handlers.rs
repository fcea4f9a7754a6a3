// src/auth_handlers.rs - Authentication route handlers

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{get_current_user, AuthService, Claims, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, User, UserResponse};
use crate::AppState;

pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let mut request = request.into_inner();

    let role = match request.role.as_deref() {
        None | Some("admin") => UserRole::Admin,
        Some("employee") => UserRole::Employee,
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "Invalid role '{}'. Valid roles: admin, employee",
                other
            )))
        }
    };

    // An authenticated admin creating an employee account links it to
    // themselves; unauthenticated signup only creates admins. Registration
    // sits outside the jwt middleware, so the token is checked here.
    if role == UserRole::Employee {
        let claims = bearer_claims(&http_request, &auth_service)
            .map_err(|_| ApiError::Forbidden("Employee accounts are created by an admin".to_string()))?;
        if claims.role != UserRole::Admin {
            return Err(ApiError::Forbidden(
                "Only admins can create employee accounts".to_string(),
            ));
        }
        request.admin_id = Some(claims.sub);
    } else {
        request.admin_id = None;
    }

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = ? OR email = ?")
            .bind(&request.username)
            .bind(&request.email)
            .fetch_optional(&app_state.db_pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::BadRequest(
            "Username or email already exists".to_string(),
        ));
    }

    let user = User::create(&app_state.db_pool, request, role, &auth_service).await?;
    let token = auth_service.generate_token(&user)?;

    log::info!("New user registered: {} ({})", user.username, user.role);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        LoginResponse {
            token,
            user: user.into(),
        },
        "User registered successfully".to_string(),
    )))
}

fn bearer_claims(http_request: &HttpRequest, auth_service: &AuthService) -> ApiResult<Claims> {
    let header = http_request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization header"))?;
    auth_service.verify_token(token)
}

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let user = User::find_by_username(&app_state.db_pool, &request.username)
        .await
        .map_err(|_| ApiError::BadRequest("Invalid username or password".to_string()))?;

    if !auth_service.verify_password(&request.password, &user.password_hash)? {
        return Err(ApiError::BadRequest(
            "Invalid username or password".to_string(),
        ));
    }

    let token = auth_service.generate_token(&user)?;

    log::info!("User {} logged in", user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        LoginResponse {
            token,
            user: user.into(),
        },
        "Login successful".to_string(),
    )))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;
    let response: UserResponse = user.into();

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}
