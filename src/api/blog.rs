//! Blog endpoints
//!
//! Public:
//! - GET /api/v1/blog/posts
//! - GET /api/v1/blog/posts/{slug}
//! - GET /api/v1/blog/posts/{slug}/related
//! - GET /api/v1/blog/categories
//! - GET /api/v1/blog/tags
//! - GET /api/v1/blog/search
//! - GET /api/v1/blog/sitemap.xml
//!
//! Admin (posts addressed by id):
//! - POST   /api/v1/blog/posts
//! - PUT    /api/v1/blog/posts/{id}
//! - DELETE /api/v1/blog/posts/{id}
//! - POST   /api/v1/blog/posts/{id}/publish
//! - GET    /api/v1/blog/drafts

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::common::{ApiJson, ApiQuery, IdPath, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{message, paged, ApiResponse, ApiResult};
use crate::models::{BlogPost, TermWithCount};
use crate::services::{CreatePostInput, PostDetail, UpdatePostInput};

// Slug and id share one path segment name so both routers can merge.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{post}", get(get_post))
        .route("/posts/{post}/related", get(related_posts))
        .route("/categories", get(categories))
        .route("/tags", get(tags))
        .route("/search", get(search))
        .route("/sitemap.xml", get(sitemap))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{post}", put(update_post).delete(delete_post))
        .route("/posts/{post}/publish", post(publish_post))
        .route("/drafts", get(drafts))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPostsQuery {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListPostsQuery {
    fn page(&self) -> Result<crate::services::Pagination, ApiError> {
        PageQuery {
            page: self.page.clone(),
            limit: self.limit.clone(),
        }
        .pagination()
    }
}

/// GET /api/v1/blog/posts
async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListPostsQuery>,
) -> ApiResult<Value> {
    let (posts, meta) = state
        .blog_service
        .list_published(
            query.category.as_deref(),
            query.tag.as_deref(),
            query.q.as_deref(),
            query.page()?,
        )
        .await?;
    Ok(paged("posts", posts, meta))
}

/// GET /api/v1/blog/posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<PostDetail> {
    Ok(ApiResponse::ok(state.blog_service.view(&slug).await?))
}

/// GET /api/v1/blog/posts/{slug}/related
async fn related_posts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Vec<BlogPost>> {
    Ok(ApiResponse::ok(state.blog_service.related(&slug).await?))
}

/// GET /api/v1/blog/categories
async fn categories(State(state): State<AppState>) -> ApiResult<Vec<TermWithCount>> {
    Ok(ApiResponse::ok(state.blog_service.categories().await?))
}

/// GET /api/v1/blog/tags
async fn tags(State(state): State<AppState>) -> ApiResult<Vec<TermWithCount>> {
    Ok(ApiResponse::ok(state.blog_service.tags().await?))
}

/// GET /api/v1/blog/search?q=
async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListPostsQuery>,
) -> ApiResult<Value> {
    let (posts, meta) = state
        .blog_service
        .search(query.q.as_deref(), query.page()?)
        .await?;
    Ok(paged("posts", posts, meta))
}

/// GET /api/v1/blog/sitemap.xml
async fn sitemap(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let xml = state.blog_service.sitemap().await?;
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml))
}

/// POST /api/v1/blog/posts
async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(author): AuthenticatedUser,
    ApiJson(body): ApiJson<CreatePostInput>,
) -> ApiResult<PostDetail> {
    let post = state.blog_service.create(&author, body).await?;
    Ok(ApiResponse::created(post))
}

/// PUT /api/v1/blog/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<UpdatePostInput>,
) -> ApiResult<PostDetail> {
    Ok(ApiResponse::ok(state.blog_service.update(&id, body).await?))
}

/// DELETE /api/v1/blog/posts/{id}
async fn delete_post(State(state): State<AppState>, IdPath(id): IdPath) -> ApiResult<Value> {
    state.blog_service.delete(&id).await?;
    Ok(message("Post deleted successfully"))
}

/// POST /api/v1/blog/posts/{id}/publish
async fn publish_post(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<BlogPost> {
    Ok(ApiResponse::ok(state.blog_service.publish(&id).await?))
}

/// GET /api/v1/blog/drafts
async fn drafts(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<Value> {
    let (posts, meta) = state.blog_service.drafts(query.pagination()?).await?;
    Ok(paged("posts", posts, meta))
}
