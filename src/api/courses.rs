//! Course endpoints
//!
//! - GET    /api/v1/courses
//! - GET    /api/v1/courses/{id}
//! - POST   /api/v1/courses/{id}/enroll
//! - GET    /api/v1/courses/my/enrollments
//! - POST   /api/v1/courses (admin)
//! - DELETE /api/v1/courses/{id} (admin)

use axum::{
    extract::State,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::common::{ApiJson, ApiQuery, IdPath, PageQuery};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{message, paged, ApiResponse, ApiResult};
use crate::models::{Course, Enrollment, EnrollmentView};
use crate::services::CreateCourseInput;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses))
        .route("/{id}", get(get_course))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/{id}/enroll", post(enroll))
        .route("/my/enrollments", get(my_enrollments))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_course))
        .route("/{id}", delete(delete_course))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCoursesQuery {
    pub course_type: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/v1/courses
async fn list_courses(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListCoursesQuery>,
) -> ApiResult<Value> {
    let page = PageQuery {
        page: query.page.clone(),
        limit: query.limit.clone(),
    }
    .pagination()?;
    let (courses, meta) = state
        .course_service
        .list(query.course_type.as_deref(), page)
        .await?;
    Ok(paged("courses", courses, meta))
}

/// GET /api/v1/courses/{id}
async fn get_course(State(state): State<AppState>, IdPath(id): IdPath) -> ApiResult<Course> {
    Ok(ApiResponse::ok(state.course_service.get(&id).await?))
}

/// POST /api/v1/courses/{id}/enroll
async fn enroll(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    IdPath(id): IdPath,
) -> ApiResult<Enrollment> {
    let enrollment = state.course_service.enroll(&user.id, &id).await?;
    Ok(ApiResponse::created(enrollment))
}

/// GET /api/v1/courses/my/enrollments
async fn my_enrollments(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> ApiResult<Vec<EnrollmentView>> {
    Ok(ApiResponse::ok(
        state.course_service.enrollments(&user.id).await?,
    ))
}

/// POST /api/v1/courses
async fn create_course(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateCourseInput>,
) -> ApiResult<Course> {
    let course = state.course_service.create(body).await?;
    Ok(ApiResponse::created(course))
}

/// DELETE /api/v1/courses/{id}
async fn delete_course(State(state): State<AppState>, IdPath(id): IdPath) -> ApiResult<Value> {
    state.course_service.delete(&id).await?;
    Ok(message("Course deleted successfully"))
}
