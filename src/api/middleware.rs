//! API middleware
//!
//! Contains middleware for:
//! - Authentication (JWT bearer validation)
//! - Authorization (admin role, subscription tier)
//! - Per-IP rate limiting

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxApplicationRepository, SqlxBlogRepository, SqlxChatRepository,
    SqlxConsultationRepository, SqlxCourseRepository, SqlxPaymentRepository,
    SqlxScholarshipRepository, SqlxSubscriptionRepository, SqlxSupportRepository,
    SqlxUniversityRepository, SqlxUserRepository,
};
use crate::models::{SubscriptionTier, User};
use crate::services::{
    ApplicationService, BlogService, ChatResponder, ChatService, ConsultationService,
    CourseService, DocumentService, EmailService, PaymentService, RateLimiter,
    ScholarshipService, ServiceError, SubscriptionService, SupportService, TokenService,
    UniversityService, UserService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: crate::db::DynDatabasePool,
    pub config: Arc<Config>,
    pub token_service: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub user_service: Arc<UserService>,
    pub document_service: Arc<DocumentService>,
    pub university_service: Arc<UniversityService>,
    pub application_service: Arc<ApplicationService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub payment_service: Arc<PaymentService>,
    pub scholarship_service: Arc<ScholarshipService>,
    pub course_service: Arc<CourseService>,
    pub consultation_service: Arc<ConsultationService>,
    pub support_service: Arc<SupportService>,
    pub chat_service: Arc<ChatService>,
    pub blog_service: Arc<BlogService>,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn new(
        pool: crate::db::DynDatabasePool,
        config: Config,
        responder: Arc<dyn ChatResponder>,
    ) -> anyhow::Result<Self> {
        let base_url = config.server.base_url.clone();

        let users = SqlxUserRepository::boxed(pool.clone());
        let universities = SqlxUniversityRepository::boxed(pool.clone());
        let applications = SqlxApplicationRepository::boxed(pool.clone());
        let subscriptions = SqlxSubscriptionRepository::boxed(pool.clone());
        let payments = SqlxPaymentRepository::boxed(pool.clone());

        let email = Arc::new(EmailService::new(&config.mail, &base_url)?);
        let token_service = Arc::new(TokenService::new(&config.auth));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        let subscription_service = Arc::new(SubscriptionService::new(
            subscriptions.clone(),
            payments.clone(),
            users.clone(),
            email.clone(),
            &base_url,
        ));
        let payment_service = Arc::new(PaymentService::new(
            payments,
            subscriptions,
            subscription_service.clone(),
            &config.payment,
            &base_url,
        ));

        Ok(Self {
            user_service: Arc::new(UserService::new(
                users.clone(),
                token_service.clone(),
                rate_limiter.clone(),
                email.clone(),
            )),
            document_service: Arc::new(DocumentService::new(
                applications.clone(),
                config.upload.clone(),
            )),
            university_service: Arc::new(UniversityService::new(universities.clone())),
            application_service: Arc::new(ApplicationService::new(
                applications,
                universities,
                users,
                email,
            )),
            subscription_service,
            payment_service,
            scholarship_service: Arc::new(ScholarshipService::new(
                SqlxScholarshipRepository::boxed(pool.clone()),
            )),
            course_service: Arc::new(CourseService::new(SqlxCourseRepository::boxed(
                pool.clone(),
            ))),
            consultation_service: Arc::new(ConsultationService::new(
                SqlxConsultationRepository::boxed(pool.clone()),
            )),
            support_service: Arc::new(SupportService::new(SqlxSupportRepository::boxed(
                pool.clone(),
            ))),
            chat_service: Arc::new(ChatService::new(
                SqlxChatRepository::boxed(pool.clone()),
                responder,
            )),
            blog_service: Arc::new(BlogService::new(
                SqlxBlogRepository::boxed(pool.clone()),
                &base_url,
            )),
            token_service,
            rate_limiter,
            config: Arc::new(config),
            pool,
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// User attached by [`optional_auth`], if any
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Error envelope: `{success:false, error:{code,message,details?}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip, default = "internal_status")]
    pub status: StatusCode,
    pub success: bool,
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn internal_status() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation_error(field: &str, message: impl Into<String>) -> Self {
        ServiceError::invalid_field(field, message).into()
    }

    pub fn internal_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An unexpected error occurred",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Map a database constraint failure anywhere in the chain
fn constraint_error(err: &anyhow::Error) -> Option<ApiError> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .find_map(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Some(ApiError::new(
                StatusCode::CONFLICT,
                "DUPLICATE_ENTRY",
                "A record with this value already exists",
            )),
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => Some(
                ApiError::bad_request("FOREIGN_KEY_ERROR", "Referenced record does not exist"),
            ),
            _ => None,
        })
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        match err {
            ServiceError::Validation(fields) => Self::bad_request(code, "Validation failed")
                .with_details(serde_json::to_value(fields).unwrap_or_default()),
            ServiceError::BadRequest { message, .. } => Self::bad_request(code, message),
            ServiceError::Unauthorized { message, .. } => {
                Self::new(StatusCode::UNAUTHORIZED, code, message)
            }
            ServiceError::PaymentRequired { message, .. } => {
                Self::new(StatusCode::PAYMENT_REQUIRED, code, message)
            }
            ServiceError::Forbidden {
                message, details, ..
            } => {
                let mut e = Self::new(StatusCode::FORBIDDEN, code, message);
                e.error.details = details;
                e
            }
            ServiceError::NotFound { message, .. } => {
                Self::new(StatusCode::NOT_FOUND, code, message)
            }
            ServiceError::Conflict { message, .. } => {
                Self::new(StatusCode::CONFLICT, code, message)
            }
            ServiceError::TooManyRequests { message, .. } => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, code, message)
            }
            ServiceError::Internal(e) => constraint_error(&e).unwrap_or_else(|| {
                tracing::error!("Unhandled error: {:#}", e);
                Self::internal_error()
            }),
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify `token` and load its user, which must still exist and be active
async fn resolve_user(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state.token_service.verify(token)?;
    state
        .user_service
        .get_by_id(&claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "User not found or inactive",
            )
        })
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Access token required"))?
        .to_string();

    let user = resolve_user(&state, &token).await?;
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(request.headers()).map(String::from) {
        if let Ok(user) = resolve_user(&state, &token).await {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin access required"));
    }

    Ok(next.run(request).await)
}

/// Tier gate; runs after [`require_auth`]
pub async fn require_subscription(
    required: SubscriptionTier,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let current = user.0.effective_tier(chrono::Utc::now());
    if !current.satisfies(required) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "SUBSCRIPTION_REQUIRED",
            format!("This feature requires the {} plan or higher", required),
        )
        .with_details(serde_json::json!({
            "requiredPlan": required,
            "currentPlan": current,
        })));
    }

    Ok(next.run(request).await)
}

/// Client address: proxy headers first, then the socket peer
pub fn client_ip(request: &Request) -> Option<IpAddr> {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    };
    let peer = || {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };
    forwarded.or_else(real_ip).or_else(peer)
}

/// Fixed-window request limit per client IP
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(ip) = client_ip(&request) {
        if !state.rate_limiter.check_request(ip).await {
            tracing::warn!("Rate limit exceeded for {}", ip);
            return Err(ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests, please try again later",
            ));
        }
    }
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|AuthenticatedUser(user)| user.clone()),
        ))
    }
}
