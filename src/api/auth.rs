use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bcrypt::{DEFAULT_COST, hash, verify};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::store::models::User;
use crate::store::{Store, StoreError, bounded};

use super::jwt::JwtManager;
use super::middleware::AuthUser;

#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<dyn Store>,
    pub jwt_manager: Arc<JwtManager>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
}

#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {:?}", self.0);

        // Store failures map onto the retryable/not-found taxonomy first.
        if let Some(store_err) = self.0.downcast_ref::<StoreError>() {
            let (status, message) = match store_err {
                StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
                StoreError::AlreadyExists(_) => (StatusCode::CONFLICT, "Already exists"),
                StoreError::Unavailable(_) | StoreError::Timeout => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage unavailable, please retry",
                ),
            };
            let body = Json(serde_json::json!({ "error": message }));
            return (status, body).into_response();
        }

        let (status, message) = match self.0.to_string().as_str() {
            msg if msg.contains("Invalid username or password") => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password")
            }
            msg if msg.contains("Username already exists") => {
                (StatusCode::CONFLICT, "Username already exists")
            }
            msg if msg.starts_with("Invalid") || msg.contains("Password must") => {
                (StatusCode::BAD_REQUEST, "Invalid request")
            }
            msg if msg.contains("not found") => (StatusCode::NOT_FOUND, "Not found"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Validates username format
/// - Must be 3-20 characters long
/// - Can only contain alphanumeric characters, underscores, and hyphens
pub fn validate_username(username: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if username.len() < 3 {
        errors.push("Username must be at least 3 characters long".to_string());
    }

    if username.len() > 20 {
        errors.push("Username must be at most 20 characters long".to_string());
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        errors.push("Username can only contain letters, numbers, underscores, and hyphens".to_string());
    }

    if username.starts_with('_') || username.starts_with('-') {
        errors.push("Username cannot start with underscore or hyphen".to_string());
    }

    if username.ends_with('_') || username.ends_with('-') {
        errors.push("Username cannot end with underscore or hyphen".to_string());
    }

    errors
}

pub async fn register(
    State(state): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    // Validation happens before any storage side effect.
    let username_errors = validate_username(&req.username);
    if !username_errors.is_empty() {
        return Err(anyhow::anyhow!("Invalid username: {}", username_errors.join(", ")).into());
    }

    if req.password.is_empty() || req.password.len() < 6 {
        return Err(anyhow::anyhow!("Password must be at least 6 characters").into());
    }

    let existing_user = bounded(state.store.get_user_by_username(&req.username)).await?;
    if existing_user.is_some() {
        return Err(anyhow::anyhow!("Username already exists").into());
    }

    let password_hash = hash(&req.password, DEFAULT_COST).context("Failed to hash password")?;

    let user = User::new(&req.username, Some(password_hash));
    bounded(state.store.insert_user(&user)).await?;

    let token = state.jwt_manager.generate_token(&user.id, &user.username)?;

    info!("User registered successfully: {}", user.username);

    Ok(Json(AuthResponse {
        token,
        user: UserInfo {
            id: user.id,
            username: user.username,
        },
    })
    .into_response())
}

pub async fn login(
    State(state): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let user = bounded(state.store.get_user_by_username(&req.username))
        .await?
        .ok_or_else(|| anyhow::anyhow!("Invalid username or password"))?;

    // Legacy users created through the question routes carry no password.
    let password_hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Invalid username or password"))?;

    let is_valid = verify(&req.password, password_hash).context("Failed to verify password")?;
    if !is_valid {
        return Err(anyhow::anyhow!("Invalid username or password").into());
    }

    let token = state.jwt_manager.generate_token(&user.id, &user.username)?;

    info!("User logged in successfully: {}", user.username);

    Ok(Json(AuthResponse {
        token,
        user: UserInfo {
            id: user.id,
            username: user.username,
        },
    })
    .into_response())
}

pub async fn get_current_user(
    State(state): State<AuthState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Response, AppError> {
    let user = bounded(state.store.get_user_by_id(&auth.user_id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found"))?;

    Ok(Json(UserInfo {
        id: user.id,
        username: user.username,
    })
    .into_response())
}
