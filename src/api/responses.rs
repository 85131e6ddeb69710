//! Success envelope
//!
//! Every successful response is `{success:true, data}`; lists put their
//! items next to a `pagination` block inside `data`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use super::middleware::ApiError;
use crate::services::PageMeta;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            status: StatusCode::OK,
        }
    }

    /// 201 Created
    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// `{message}` payload for operations with nothing else to return
pub fn message(text: &str) -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(json!({ "message": text }))
}

/// `{<key>: items, pagination}` payload
pub fn paged<T: Serialize>(key: &str, items: Vec<T>, meta: PageMeta) -> ApiResponse<serde_json::Value> {
    let mut data = serde_json::Map::new();
    data.insert(key.to_string(), json!(items));
    data.insert("pagination".to_string(), json!(meta));
    ApiResponse::ok(serde_json::Value::Object(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::ok(json!({"id": 1}))).unwrap();
        assert_eq!(body, json!({"success": true, "data": {"id": 1}}));
        assert_eq!(
            ApiResponse::created(()).into_response().status(),
            StatusCode::CREATED
        );
    }

    #[test]
    fn test_paged_payload() {
        let meta = crate::services::Pagination { page: 2, limit: 1 }.meta(3);
        let body = serde_json::to_value(paged("items", vec!["b"], meta)).unwrap();
        assert_eq!(body["data"]["items"], json!(["b"]));
        assert_eq!(body["data"]["pagination"]["totalPages"], 3);
        assert_eq!(body["data"]["pagination"]["hasMore"], true);
    }
}
