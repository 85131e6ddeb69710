//! University endpoints
//!
//! - GET    /api/v1/universities (optional auth; capped for free tier)
//! - GET    /api/v1/universities/countries
//! - GET    /api/v1/universities/{id}
//! - POST   /api/v1/universities (admin)
//! - PUT    /api/v1/universities/{id} (admin)
//! - DELETE /api/v1/universities/{id} (admin)

use axum::{
    extract::State,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::api::common::{non_blank, parse_param, ApiJson, ApiQuery, IdPath, PageQuery};
use crate::api::middleware::{AppState, MaybeUser};
use crate::api::responses::{message, ApiResponse, ApiResult};
use crate::db::repositories::{CountryCount, UniversityFilter};
use crate::models::University;
use crate::services::{UniversityDetail, UniversityInput, UniversityListing};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_universities))
        .route("/countries", get(list_countries))
        .route("/{id}", get(get_university))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_university))
        .route(
            "/{id}",
            axum::routing::put(update_university).delete(delete_university),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUniversitiesQuery {
    pub country: Option<String>,
    pub max_ranking: Option<String>,
    pub has_scholarship: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/v1/universities
async fn list_universities(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    ApiQuery(query): ApiQuery<ListUniversitiesQuery>,
) -> ApiResult<UniversityListing> {
    let page = PageQuery {
        page: query.page.clone(),
        limit: query.limit.clone(),
    }
    .pagination()?;
    let filter = UniversityFilter {
        country: non_blank(&query.country),
        max_ranking: parse_param("maxRanking", query.max_ranking.as_deref())?,
        has_scholarship: parse_param("hasScholarship", query.has_scholarship.as_deref())?,
        search: non_blank(&query.search),
    };
    let tier = user.map(|u| u.effective_tier(Utc::now()));

    let listing = state.university_service.list(&filter, page, tier).await?;
    Ok(ApiResponse::ok(listing))
}

/// GET /api/v1/universities/countries
async fn list_countries(State(state): State<AppState>) -> ApiResult<Vec<CountryCount>> {
    Ok(ApiResponse::ok(state.university_service.countries().await?))
}

/// GET /api/v1/universities/{id}
async fn get_university(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<UniversityDetail> {
    Ok(ApiResponse::ok(state.university_service.detail(&id).await?))
}

/// POST /api/v1/universities
async fn create_university(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UniversityInput>,
) -> ApiResult<University> {
    let university = state.university_service.create(body).await?;
    Ok(ApiResponse::created(university))
}

/// PUT /api/v1/universities/{id}
async fn update_university(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<UniversityInput>,
) -> ApiResult<University> {
    Ok(ApiResponse::ok(state.university_service.update(&id, body).await?))
}

/// DELETE /api/v1/universities/{id}
async fn delete_university(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Value> {
    state.university_service.delete(&id).await?;
    Ok(message("University deleted successfully"))
}
