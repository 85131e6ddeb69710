//! Service info and health check
//!
//! - GET /
//! - GET /api/health

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::ApiResponse;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.pool.ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "ok",
            "timestamp": Utc::now().to_rfc3339(),
            "database": "connected",
        }))),
        Err(e) => {
            tracing::error!("Health check failed: {:#}", e);
            Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Database is not reachable",
            )
            .with_details(json!({
                "status": "error",
                "timestamp": Utc::now().to_rfc3339(),
                "database": "disconnected",
            })))
        }
    }
}

/// GET /
pub async fn root() -> impl IntoResponse {
    ApiResponse::ok(json!({
        "name": "Unibridge API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/health",
            "auth": "/api/v1/auth",
            "users": "/api/v1/users",
            "universities": "/api/v1/universities",
            "programs": "/api/v1/programs",
            "applications": "/api/v1/applications",
            "subscriptions": "/api/v1/subscriptions",
            "payments": "/api/v1/payments",
            "scholarships": "/api/v1/scholarships",
            "courses": "/api/v1/courses",
            "consultations": "/api/v1/consultations",
            "support": "/api/v1/support",
            "chat": "/api/v1/chat",
            "blog": "/api/v1/blog",
        }
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
