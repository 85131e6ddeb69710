//! Subscription endpoints
//!
//! - GET  /api/v1/subscriptions/plans (public)
//! - POST /api/v1/subscriptions
//! - GET  /api/v1/subscriptions/my-subscriptions
//! - GET  /api/v1/subscriptions/current
//! - POST /api/v1/subscriptions/{id}/activate
//! - POST /api/v1/subscriptions/{id}/cancel

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};

use crate::api::common::{ApiJson, IdPath};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{Plan, Subscription};
use crate::services::{CreateSubscriptionInput, CurrentSubscription, SubscriptionCreated};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/plans", get(plans))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_subscription))
        .route("/my-subscriptions", get(my_subscriptions))
        .route("/current", get(current))
        .route("/{id}/activate", post(activate))
        .route("/{id}/cancel", post(cancel))
}

/// GET /api/v1/subscriptions/plans
async fn plans(State(state): State<AppState>) -> ApiResponse<Vec<Plan>> {
    ApiResponse::ok(state.subscription_service.plans())
}

/// POST /api/v1/subscriptions
async fn create_subscription(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateSubscriptionInput>,
) -> ApiResult<SubscriptionCreated> {
    let created = state.subscription_service.create(&user, body).await?;
    Ok(ApiResponse::created(created))
}

/// GET /api/v1/subscriptions/my-subscriptions
async fn my_subscriptions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Vec<Subscription>> {
    Ok(ApiResponse::ok(state.subscription_service.list(&user.id).await?))
}

/// GET /api/v1/subscriptions/current
async fn current(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResponse<CurrentSubscription> {
    ApiResponse::ok(state.subscription_service.current(&user))
}

/// POST /api/v1/subscriptions/{id}/activate
async fn activate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Subscription> {
    Ok(ApiResponse::ok(
        state.subscription_service.activate(&user, &id).await?,
    ))
}

/// POST /api/v1/subscriptions/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Subscription> {
    Ok(ApiResponse::ok(
        state.subscription_service.cancel(&user, &id).await?,
    ))
}
