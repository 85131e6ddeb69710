//! Payment endpoints
//!
//! - POST /api/v1/payments/create
//! - POST /api/v1/payments/verify
//! - GET  /api/v1/payments/history
//! - POST /api/v1/payments/webhook/stripe (public)

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::api::common::{ApiJson, ApiQuery, PageQuery};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{paged, ApiResponse, ApiResult};
use crate::services::{CreatePaymentInput, PaymentCreated, VerifyOutcome, VerifyPaymentInput};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/webhook/stripe", post(stripe_webhook))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_payment))
        .route("/verify", post(verify_payment))
        .route("/history", get(history))
}

/// POST /api/v1/payments/create
async fn create_payment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreatePaymentInput>,
) -> ApiResult<PaymentCreated> {
    let created = state.payment_service.create(&user, body).await?;
    Ok(ApiResponse::created(created))
}

/// POST /api/v1/payments/verify
async fn verify_payment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<VerifyPaymentInput>,
) -> ApiResult<VerifyOutcome> {
    Ok(ApiResponse::ok(state.payment_service.verify(&user, body).await?))
}

/// GET /api/v1/payments/history
async fn history(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Value> {
    let (payments, meta) = state
        .payment_service
        .history(&user.id, query.pagination()?)
        .await?;
    Ok(paged("payments", payments, meta))
}

/// POST /api/v1/payments/webhook/stripe
///
/// Card processing is handled out of band; events are acknowledged only.
async fn stripe_webhook(body: axum::body::Bytes) -> ApiResponse<Value> {
    tracing::info!("Stripe webhook received ({} bytes)", body.len());
    ApiResponse::ok(json!({ "received": true }))
}
