//! User profile and document endpoints (all authenticated)
//!
//! - GET    /api/v1/users/profile
//! - PUT    /api/v1/users/profile
//! - GET    /api/v1/users/documents
//! - POST   /api/v1/users/documents (multipart)
//! - DELETE /api/v1/users/documents/{id}

use axum::{
    extract::{Multipart, State},
    routing::{delete, get},
    Router,
};
use serde_json::Value;

use crate::api::auth::update_profile;
use crate::api::common::IdPath;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{message, ApiResponse, ApiResult};
use crate::models::Document;
use crate::services::document::missing_file;
use crate::services::{UploadInput, UserProfile};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(profile).put(update_profile))
        .route("/documents", get(list_documents).post(upload_document))
        .route("/documents/{id}", delete(delete_document))
}

/// GET /api/v1/users/profile
async fn profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResponse<UserProfile> {
    ApiResponse::ok(state.user_service.profile(user))
}

/// GET /api/v1/users/documents
async fn list_documents(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Vec<Document>> {
    Ok(ApiResponse::ok(state.document_service.list(&user.id).await?))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request("BAD_REQUEST", format!("Failed to read multipart: {}", e))
}

/// POST /api/v1/users/documents
///
/// Accepts multipart/form-data with a `file` field plus `documentType` and
/// an optional `applicationId`.
async fn upload_document(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> ApiResult<Document> {
    let mut input = UploadInput::default();
    let mut has_file = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                input.file_name = field.file_name().unwrap_or("").to_string();
                input.content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                input.data = field.bytes().await.map_err(multipart_error)?.to_vec();
                has_file = true;
            }
            "documentType" => {
                input.document_type = Some(field.text().await.map_err(multipart_error)?);
            }
            "applicationId" => {
                input.application_id = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => continue,
        }
    }

    if !has_file {
        return Err(missing_file().into());
    }

    let document = state.document_service.upload(&user.id, input).await?;
    Ok(ApiResponse::created(document))
}

/// DELETE /api/v1/users/documents/{id}
async fn delete_document(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Value> {
    state.document_service.delete(&user.id, &id).await?;
    Ok(message("Document deleted successfully"))
}
