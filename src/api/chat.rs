//! Chat assistant endpoints (authenticated)
//!
//! - POST   /api/v1/chat/message
//! - GET    /api/v1/chat/conversations
//! - GET    /api/v1/chat/conversations/{id}
//! - DELETE /api/v1/chat/conversations/{id}

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::common::{ApiJson, ApiQuery, IdPath, PageQuery};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{message, paged, ApiResponse, ApiResult};
use crate::services::{ChatReply, ConversationDetail};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/message", post(send_message))
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/{id}",
            get(get_conversation).delete(delete_conversation),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: Option<String>,
    pub conversation_id: Option<String>,
}

/// POST /api/v1/chat/message
async fn send_message(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<SendMessageRequest>,
) -> ApiResult<ChatReply> {
    let reply = state
        .chat_service
        .send(&user, body.message.as_deref(), body.conversation_id.as_deref())
        .await?;
    Ok(ApiResponse::ok(reply))
}

/// GET /api/v1/chat/conversations
async fn list_conversations(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Value> {
    let (conversations, meta) = state
        .chat_service
        .conversations(&user.id, query.pagination()?)
        .await?;
    Ok(paged("conversations", conversations, meta))
}

/// GET /api/v1/chat/conversations/{id}
async fn get_conversation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<ConversationDetail> {
    Ok(ApiResponse::ok(
        state.chat_service.conversation(&user.id, &id).await?,
    ))
}

/// DELETE /api/v1/chat/conversations/{id}
async fn delete_conversation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Value> {
    state.chat_service.delete(&user.id, &id).await?;
    Ok(message("Conversation deleted successfully"))
}
