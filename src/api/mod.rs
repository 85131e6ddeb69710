//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1` and answer with the
//! `{success, data}` / `{success:false, error}` envelope. Routes are grouped
//! by the guard they need: public, authenticated, global plan and admin.

pub mod applications;
pub mod auth;
pub mod blog;
pub mod chat;
pub mod common;
pub mod consultations;
pub mod courses;
pub mod health;
pub mod middleware;
pub mod payments;
pub mod programs;
pub mod responses;
pub mod scholarships;
pub mod subscriptions;
pub mod support;
pub mod universities;
pub mod users;


use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::models::SubscriptionTier;

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
pub use responses::{ApiResponse, ApiResult};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/universities", universities::admin_router())
        .nest("/programs", programs::admin_router())
        .nest("/applications", applications::admin_router())
        .nest("/scholarships", scholarships::admin_router())
        .nest("/courses", courses::admin_router())
        .nest("/consultations", consultations::admin_router())
        .nest("/support", support::admin_router())
        .nest("/blog", blog::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Global plan routes
    let premium_routes = Router::new()
        .nest("/scholarships", scholarships::premium_router())
        .route_layer(axum_middleware::from_fn(|request: Request, next: Next| {
            middleware::require_subscription(SubscriptionTier::Global, request, next)
        }))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/users", users::router())
        .nest("/applications", applications::router())
        .nest("/subscriptions", subscriptions::protected_router())
        .nest("/payments", payments::protected_router())
        .nest("/scholarships", scholarships::protected_router())
        .nest("/courses", courses::protected_router())
        .nest("/consultations", consultations::router())
        .nest("/support", support::router())
        .nest("/chat", chat::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; the university listing adapts to the caller's plan
    let tiered_routes = Router::new()
        .nest("/universities", universities::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/programs", programs::public_router())
        .nest("/subscriptions", subscriptions::public_router())
        .nest("/payments", payments::public_router())
        .nest("/scholarships", scholarships::public_router())
        .nest("/courses", courses::public_router())
        .nest("/blog", blog::public_router())
        .merge(tiered_routes)
        .merge(admin_routes)
        .merge(premium_routes)
        .merge(protected_routes)
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::rate_limit,
        ))
}

/// CORS for the configured origins (comma separated)
fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors_origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Unknown API routes get the error envelope; anything else is looked up in
/// `server.static_dir` when one is configured
async fn fallback(State(state): State<AppState>, request: Request) -> Response {
    match &state.config.server.static_dir {
        Some(dir) if !request.uri().path().starts_with("/api") => {
            match ServeDir::new(dir).oneshot(request).await {
                Ok(response) => response.map(Body::new),
                Err(never) => match never {},
            }
        }
        _ => health::not_found().await.into_response(),
    }
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let body_limit = config.upload.max_file_size as usize + 1024 * 1024;

    let router = Router::new()
        .route("/", get(health::root))
        .route("/api/health", get(health::health))
        .nest("/api/v1", build_api_router(state.clone()))
        .fallback(fallback);

    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CompressionLayer::new())
                .layer(cors_layer(&config.server.cors_origin))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                ))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
