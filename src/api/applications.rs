//! Application endpoints (authenticated)
//!
//! - POST /api/v1/applications
//! - GET  /api/v1/applications
//! - GET  /api/v1/applications/stats
//! - GET  /api/v1/applications/{id}
//! - POST /api/v1/applications/{id}/withdraw
//! - PUT  /api/v1/applications/{id}/status (admin)

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::common::{ApiJson, ApiQuery, IdPath, PageQuery};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{paged, ApiResponse, ApiResult};
use crate::models::Application;
use crate::services::{ApplicationDetail, ApplicationStats, CreateApplicationInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_application).get(list_applications))
        .route("/stats", get(stats))
        .route("/{id}", get(get_application))
        .route("/{id}/withdraw", post(withdraw))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/{id}/status", put(set_status))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListApplicationsQuery {
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

/// POST /api/v1/applications
async fn create_application(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateApplicationInput>,
) -> ApiResult<Value> {
    let application = state.application_service.create(&user, body).await?;
    Ok(ApiResponse::created(json!({
        "message": "Application submitted successfully",
        "application": application,
    })))
}

/// GET /api/v1/applications
async fn list_applications(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiQuery(query): ApiQuery<ListApplicationsQuery>,
) -> ApiResult<Value> {
    let page = PageQuery {
        page: query.page.clone(),
        limit: query.limit.clone(),
    }
    .pagination()?;
    let (applications, meta) = state
        .application_service
        .list(&user.id, query.status.as_deref(), page)
        .await?;
    Ok(paged("applications", applications, meta))
}

/// GET /api/v1/applications/stats
async fn stats(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<ApplicationStats> {
    Ok(ApiResponse::ok(state.application_service.stats(&user).await?))
}

/// GET /api/v1/applications/{id}
async fn get_application(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<ApplicationDetail> {
    Ok(ApiResponse::ok(
        state.application_service.detail(&user.id, &id).await?,
    ))
}

/// POST /api/v1/applications/{id}/withdraw
async fn withdraw(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Application> {
    Ok(ApiResponse::ok(
        state.application_service.withdraw(&user.id, &id).await?,
    ))
}

/// PUT /api/v1/applications/{id}/status
async fn set_status(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<StatusRequest>,
) -> ApiResult<Application> {
    Ok(ApiResponse::ok(
        state
            .application_service
            .set_status(&id, body.status.as_deref())
            .await?,
    ))
}
