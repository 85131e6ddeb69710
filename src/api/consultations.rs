//! Consultation endpoints (authenticated)
//!
//! - POST /api/v1/consultations
//! - GET  /api/v1/consultations
//! - GET  /api/v1/consultations/{id}
//! - PUT  /api/v1/consultations/{id}/reschedule
//! - POST /api/v1/consultations/{id}/cancel
//! - PUT  /api/v1/consultations/{id}/confirm (admin)

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use crate::api::common::{ApiJson, ApiQuery, IdPath};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::Consultation;
use crate::services::BookConsultationInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(book).get(list_consultations))
        .route("/{id}", get(get_consultation))
        .route("/{id}/reschedule", put(reschedule))
        .route("/{id}/cancel", post(cancel))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/{id}/confirm", put(confirm))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub scheduled_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub meeting_link: Option<String>,
}

/// POST /api/v1/consultations
async fn book(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<BookConsultationInput>,
) -> ApiResult<Consultation> {
    let consultation = state.consultation_service.book(&user.id, body).await?;
    Ok(ApiResponse::created(consultation))
}

/// GET /api/v1/consultations
async fn list_consultations(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult<Vec<Consultation>> {
    Ok(ApiResponse::ok(
        state
            .consultation_service
            .list(&user.id, query.status.as_deref())
            .await?,
    ))
}

/// GET /api/v1/consultations/{id}
async fn get_consultation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Consultation> {
    Ok(ApiResponse::ok(
        state.consultation_service.get_owned(&user.id, &id).await?,
    ))
}

/// PUT /api/v1/consultations/{id}/reschedule
async fn reschedule(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<RescheduleRequest>,
) -> ApiResult<Consultation> {
    Ok(ApiResponse::ok(
        state
            .consultation_service
            .reschedule(&user.id, &id, body.scheduled_at.as_deref())
            .await?,
    ))
}

/// POST /api/v1/consultations/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Consultation> {
    Ok(ApiResponse::ok(
        state.consultation_service.cancel(&user.id, &id).await?,
    ))
}

/// PUT /api/v1/consultations/{id}/confirm
async fn confirm(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<ConfirmRequest>,
) -> ApiResult<Consultation> {
    Ok(ApiResponse::ok(
        state
            .consultation_service
            .confirm(&id, body.meeting_link.as_deref())
            .await?,
    ))
}
