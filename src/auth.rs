use actix_web::dev::ServiceRequest;
use actix_web::web;
use actix_web::{HttpMessage, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{RegisterRequest, User};

// ======== USER ROLE ========

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UserRole {
    Admin,
    Employee,
}

impl UserRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "employee" => Some(UserRole::Employee),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Employee => "employee",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub role: UserRole,
    pub admin_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration_hours: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_expiration_hours: i64, bcrypt_cost: u32) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiration_hours,
            bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        validate_password_strength(password)?;
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> ApiResult<bool> {
        verify(password, hash)
            .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))
    }

    pub fn generate_token(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_expiration_hours);

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: UserRole::from_str(&user.role).unwrap_or(UserRole::Employee),
            admin_id: user.admin_id.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== PASSWORD VALIDATION ========

fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one digit".to_string(),
        ));
    }
    Ok(())
}

// ======== USER METHODS ========

impl User {
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn create(
        pool: &SqlitePool,
        request: RegisterRequest,
        role: UserRole,
        auth_service: &AuthService,
    ) -> ApiResult<User> {
        if role == UserRole::Employee && request.admin_id.is_none() {
            return Err(ApiError::BadRequest(
                "Employee accounts require an admin_id".to_string(),
            ));
        }

        let password_hash = auth_service.hash_password(&request.password)?;
        let now = Utc::now();

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: request.username,
            email: request.email,
            password_hash,
            role: role.as_str().to_string(),
            admin_id: request.admin_id,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"INSERT INTO users (
                id, username, email, password_hash, role, admin_id,
                is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(&user.admin_id)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(pool)
        .await?;

        Ok(user)
    }

    pub fn get_role(&self) -> UserRole {
        UserRole::from_str(&self.role).unwrap_or(UserRole::Employee)
    }
}

// ======== OWNER SCOPING ========

/// Resolve the acting user to the owner whose inventory they operate on.
/// Admins own their data; employees operate on their admin's data.
pub fn resolve_owner_id(claims: &Claims) -> ApiResult<String> {
    match claims.role {
        UserRole::Admin => Ok(claims.sub.clone()),
        UserRole::Employee => claims.admin_id.clone().ok_or_else(|| {
            ApiError::Forbidden("Employee account is not linked to an admin".to_string())
        }),
    }
}

// ======== HELPER FUNCTIONS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new("test_secret_123456789012345678901234567890", 24, 4)
    }

    fn sample_user(role: &str, admin_id: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: "user-1".to_string(),
            username: "somchai".to_string(),
            email: "somchai@example.com".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            admin_id: admin_id.map(|s| s.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let svc = service();
        let user = sample_user("employee", Some("admin-9"));
        let token = svc.generate_token(&user).unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, UserRole::Employee);
        assert_eq!(claims.admin_id.as_deref(), Some("admin-9"));
    }

    #[test]
    fn test_password_hash_and_verify() {
        let svc = service();
        let hash = svc.hash_password("Str0ngPass").unwrap();
        assert!(svc.verify_password("Str0ngPass", &hash).unwrap());
        assert!(!svc.verify_password("WrongPass1", &hash).unwrap());
    }

    #[test]
    fn test_password_strength() {
        let svc = service();
        assert!(svc.hash_password("short1A").is_err());
        assert!(svc.hash_password("alllowercase1").is_err());
        assert!(svc.hash_password("ALLUPPERCASE1").is_err());
        assert!(svc.hash_password("NoDigitsHere").is_err());
    }

    #[test]
    fn test_resolve_owner_id() {
        let svc = service();
        let admin = sample_user("admin", None);
        let token = svc.generate_token(&admin).unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(resolve_owner_id(&claims).unwrap(), "user-1");

        let employee = sample_user("employee", Some("admin-9"));
        let claims = svc.verify_token(&svc.generate_token(&employee).unwrap()).unwrap();
        assert_eq!(resolve_owner_id(&claims).unwrap(), "admin-9");

        let orphan = sample_user("employee", None);
        let claims = svc.verify_token(&svc.generate_token(&orphan).unwrap()).unwrap();
        assert!(resolve_owner_id(&claims).is_err());
    }
}
