//! Program endpoints
//!
//! - GET    /api/v1/programs
//! - GET    /api/v1/programs/{id}
//! - GET    /api/v1/programs/{id}/requirements
//! - POST   /api/v1/programs (admin)
//! - PUT    /api/v1/programs/{id} (admin)
//! - DELETE /api/v1/programs/{id} (admin)

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::common::{non_blank, parse_param, ApiJson, ApiQuery, IdPath, PageQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{message, paged, ApiResponse, ApiResult};
use crate::db::repositories::ProgramFilter;
use crate::models::{Program, ProgramWithUniversity};
use crate::services::{uuid_field, ProgramInput, ProgramRequirements};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_programs))
        .route("/{id}", get(get_program))
        .route("/{id}/requirements", get(get_requirements))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_program))
        .route("/{id}", put(update_program).delete(delete_program))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProgramsQuery {
    pub degree_level: Option<String>,
    pub university_id: Option<String>,
    pub field: Option<String>,
    pub country: Option<String>,
    pub min_fee: Option<String>,
    pub max_fee: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListProgramsQuery {
    fn filter(&self) -> Result<ProgramFilter, ApiError> {
        let university_id = match non_blank(&self.university_id) {
            Some(id) => Some(uuid_field("universityId", &id)?),
            None => None,
        };
        Ok(ProgramFilter {
            degree_level: non_blank(&self.degree_level).map(|d| d.to_lowercase()),
            university_id,
            field: non_blank(&self.field),
            country: non_blank(&self.country),
            min_fee: parse_param("minFee", self.min_fee.as_deref())?,
            max_fee: parse_param("maxFee", self.max_fee.as_deref())?,
            search: non_blank(&self.search),
        })
    }
}

/// GET /api/v1/programs
async fn list_programs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListProgramsQuery>,
) -> ApiResult<Value> {
    let page = PageQuery {
        page: query.page.clone(),
        limit: query.limit.clone(),
    }
    .pagination()?;
    let (programs, meta) = state
        .university_service
        .list_programs(&query.filter()?, page)
        .await?;
    Ok(paged("programs", programs, meta))
}

/// GET /api/v1/programs/{id}
async fn get_program(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<ProgramWithUniversity> {
    Ok(ApiResponse::ok(state.university_service.get_program(&id).await?))
}

/// GET /api/v1/programs/{id}/requirements
async fn get_requirements(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<ProgramRequirements> {
    Ok(ApiResponse::ok(state.university_service.requirements(&id).await?))
}

/// POST /api/v1/programs
async fn create_program(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ProgramInput>,
) -> ApiResult<Program> {
    let program = state.university_service.create_program(body).await?;
    Ok(ApiResponse::created(program))
}

/// PUT /api/v1/programs/{id}
async fn update_program(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<ProgramInput>,
) -> ApiResult<Program> {
    Ok(ApiResponse::ok(
        state.university_service.update_program(&id, body).await?,
    ))
}

/// DELETE /api/v1/programs/{id}
async fn delete_program(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Value> {
    state.university_service.delete_program(&id).await?;
    Ok(message("Program deleted successfully"))
}
