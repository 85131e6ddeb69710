//! Common API utilities and shared types
//!
//! Extractor wrappers that report rejections through the error envelope,
//! plus helpers for the string-typed query parameters.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
};
use serde::Deserialize;
use std::str::FromStr;

use super::middleware::ApiError;
use crate::services::{parse_uuid, Pagination};

/// `Json` whose rejection is `400 INVALID_JSON`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejection is `400 BAD_REQUEST`
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `Path` id that must be a UUID (`400 INVALID_UUID`)
#[derive(Debug)]
pub struct IdPath(pub String);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => ApiError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "INVALID_JSON",
                "Expected a JSON request body",
            ),
            other => ApiError::bad_request("INVALID_JSON", other.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request("BAD_REQUEST", rejection.body_text())
    }
}

impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(raw) =
            axum::extract::Path::<String>::from_request_parts(parts, state)
                .await
                .map_err(|e| ApiError::bad_request("BAD_REQUEST", e.body_text()))?;
        Ok(IdPath(parse_uuid(&raw)?))
    }
}

/// `page` and `limit` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn pagination(&self) -> Result<Pagination, ApiError> {
        Ok(Pagination::from_query(
            self.page.as_deref(),
            self.limit.as_deref(),
        )?)
    }
}

/// Parse an optional query value, `400 VALIDATION_ERROR` when malformed
pub fn parse_param<T: FromStr>(field: &str, raw: Option<&str>) -> Result<Option<T>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ApiError::validation_error(field, format!("Invalid value: {}", value))),
        None => Ok(None),
    }
}

/// Non-blank trimmed copy of a query value
pub fn non_blank(raw: &Option<String>) -> Option<String> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param::<i64>("maxRanking", Some(" 50 ")).unwrap(), Some(50));
        assert_eq!(parse_param::<i64>("maxRanking", Some("")).unwrap(), None);
        assert_eq!(parse_param::<bool>("hasScholarship", None).unwrap(), None);
        let err = parse_param::<i64>("maxRanking", Some("top")).unwrap_err();
        assert_eq!(err.error.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_page_query() {
        let q = PageQuery {
            page: Some("0".into()),
            limit: None,
        };
        assert_eq!(q.pagination().unwrap_err().error.code, "INVALID_PAGINATION");
        assert_eq!(PageQuery::default().pagination().unwrap().limit, 10);
    }
}
