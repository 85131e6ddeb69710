//! Support ticket endpoints (authenticated)
//!
//! - POST /api/v1/support/tickets
//! - GET  /api/v1/support/tickets
//! - GET  /api/v1/support/tickets/{id}
//! - POST /api/v1/support/tickets/{id}/reply
//! - POST /api/v1/support/tickets/{id}/close
//! - GET  /api/v1/support/admin/tickets (admin)
//! - POST /api/v1/support/admin/tickets/{id}/reply (admin)

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::api::common::{ApiJson, ApiQuery, IdPath};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{SupportTicket, TicketMessage, TicketSummary};
use crate::services::{CreateTicketInput, TicketDetail};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tickets", post(create_ticket).get(list_tickets))
        .route("/tickets/{id}", get(get_ticket))
        .route("/tickets/{id}/reply", post(reply))
        .route("/tickets/{id}/close", post(close))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/tickets", get(list_all_tickets))
        .route("/admin/tickets/{id}/reply", post(staff_reply))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub message: Option<String>,
}

/// POST /api/v1/support/tickets
async fn create_ticket(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateTicketInput>,
) -> ApiResult<TicketDetail> {
    let ticket = state.support_service.create(&user, body).await?;
    Ok(ApiResponse::created(ticket))
}

/// GET /api/v1/support/tickets
async fn list_tickets(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult<Vec<TicketSummary>> {
    Ok(ApiResponse::ok(
        state
            .support_service
            .list(&user.id, query.status.as_deref())
            .await?,
    ))
}

/// GET /api/v1/support/tickets/{id}
async fn get_ticket(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<TicketDetail> {
    Ok(ApiResponse::ok(state.support_service.detail(&user, &id).await?))
}

/// POST /api/v1/support/tickets/{id}/reply
async fn reply(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<ReplyRequest>,
) -> ApiResult<TicketMessage> {
    let message = state
        .support_service
        .reply(&user, &id, body.message.as_deref())
        .await?;
    Ok(ApiResponse::created(message))
}

/// POST /api/v1/support/tickets/{id}/close
async fn close(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<SupportTicket> {
    Ok(ApiResponse::ok(state.support_service.close(&user, &id).await?))
}

/// GET /api/v1/support/admin/tickets
async fn list_all_tickets(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult<Vec<TicketSummary>> {
    Ok(ApiResponse::ok(
        state
            .support_service
            .list_all(query.status.as_deref())
            .await?,
    ))
}

/// POST /api/v1/support/admin/tickets/{id}/reply
async fn staff_reply(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<ReplyRequest>,
) -> ApiResult<TicketMessage> {
    let message = state
        .support_service
        .staff_reply(&admin, &id, body.message.as_deref())
        .await?;
    Ok(ApiResponse::created(message))
}
