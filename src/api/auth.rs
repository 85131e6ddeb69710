//! Authentication API endpoints
//!
//! Public:
//! - POST /api/v1/auth/register
//! - POST /api/v1/auth/login
//! - POST /api/v1/auth/forgot-password
//! - POST /api/v1/auth/reset-password
//!
//! Authenticated:
//! - POST /api/v1/auth/logout
//! - GET  /api/v1/auth/me
//! - PUT  /api/v1/auth/profile
//! - POST /api/v1/auth/refresh

use axum::{extract::State, routing::{get, post, put}, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::common::ApiJson;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{message, ApiResponse, ApiResult};
use crate::services::{AuthSession, LoginInput, ProfileUpdate, RegisterInput, UserProfile};

/// Routes that need no token
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/profile", put(update_profile))
        .route("/refresh", post(refresh))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub password: Option<String>,
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterInput>,
) -> ApiResult<AuthSession> {
    let session = state.user_service.register(body).await?;
    Ok(ApiResponse::created(session))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginInput>,
) -> ApiResult<AuthSession> {
    let session = state.user_service.login(body).await?;
    Ok(ApiResponse::ok(session))
}

/// POST /api/v1/auth/logout
///
/// Tokens are stateless; the client simply discards its copy.
async fn logout(_user: AuthenticatedUser) -> ApiResponse<Value> {
    message("Logged out successfully")
}

/// GET /api/v1/auth/me
async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResponse<UserProfile> {
    ApiResponse::ok(state.user_service.profile(user))
}

/// PUT /api/v1/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<ProfileUpdate>,
) -> ApiResult<UserProfile> {
    let updated = state.user_service.update_profile(&user.id, body).await?;
    Ok(ApiResponse::ok(state.user_service.profile(updated)))
}

/// POST /api/v1/auth/forgot-password
async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Value> {
    state
        .user_service
        .forgot_password(body.email.as_deref().unwrap_or_default())
        .await?;
    Ok(message(
        "If an account exists with this email, a reset link has been sent",
    ))
}

/// POST /api/v1/auth/reset-password
async fn reset_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Value> {
    state
        .user_service
        .reset_password(
            body.token.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(message("Password has been reset successfully"))
}

/// POST /api/v1/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Value> {
    let token = state.user_service.refresh(&user)?;
    Ok(ApiResponse::ok(json!({ "token": token })))
}
