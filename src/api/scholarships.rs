//! Scholarship endpoints
//!
//! - GET    /api/v1/scholarships
//! - GET    /api/v1/scholarships/{id}
//! - GET    /api/v1/scholarships/auto-match (global plan)
//! - POST   /api/v1/scholarships/{id}/apply
//! - POST   /api/v1/scholarships (admin)
//! - DELETE /api/v1/scholarships/{id} (admin)

use axum::{
    extract::State,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::common::{non_blank, ApiJson, ApiQuery, IdPath, PageQuery};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{message, paged, ApiResponse, ApiResult};
use crate::db::repositories::ScholarshipFilter;
use crate::models::{Scholarship, ScholarshipApplication};
use crate::services::CreateScholarshipInput;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_scholarships))
        .route("/{id}", get(get_scholarship))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/{id}/apply", post(apply))
}

/// Routes that also sit behind the global-plan gate
pub fn premium_router() -> Router<AppState> {
    Router::new().route("/auto-match", get(auto_match))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_scholarship))
        .route("/{id}", delete(delete_scholarship))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListScholarshipsQuery {
    pub country: Option<String>,
    pub degree_level: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/v1/scholarships
async fn list_scholarships(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListScholarshipsQuery>,
) -> ApiResult<Value> {
    let page = PageQuery {
        page: query.page.clone(),
        limit: query.limit.clone(),
    }
    .pagination()?;
    let filter = ScholarshipFilter {
        country: non_blank(&query.country),
        degree_level: non_blank(&query.degree_level).map(|d| d.to_lowercase()),
    };
    let (scholarships, meta) = state.scholarship_service.list(&filter, page).await?;
    Ok(paged("scholarships", scholarships, meta))
}

/// GET /api/v1/scholarships/{id}
async fn get_scholarship(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Scholarship> {
    Ok(ApiResponse::ok(state.scholarship_service.get(&id).await?))
}

/// GET /api/v1/scholarships/auto-match
async fn auto_match(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Value> {
    let matches = state.scholarship_service.auto_match(&user).await?;
    Ok(ApiResponse::ok(json!({
        "total": matches.len(),
        "matches": matches,
    })))
}

/// POST /api/v1/scholarships/{id}/apply
async fn apply(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<ScholarshipApplication> {
    let application = state.scholarship_service.apply(&user.id, &id).await?;
    Ok(ApiResponse::created(application))
}

/// POST /api/v1/scholarships
async fn create_scholarship(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateScholarshipInput>,
) -> ApiResult<Scholarship> {
    let scholarship = state.scholarship_service.create(body).await?;
    Ok(ApiResponse::created(scholarship))
}

/// DELETE /api/v1/scholarships/{id}
async fn delete_scholarship(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Value> {
    state.scholarship_service.delete(&id).await?;
    Ok(message("Scholarship deleted successfully"))
}
