//! Services layer - Business logic
//!
//! Each service owns the rules for one area of the platform and talks to the
//! database only through repository traits. Failures are reported as
//! [`ServiceError`], which the API layer turns into the error envelope.

pub mod application;
pub mod blog;
pub mod chat;
pub mod consultation;
pub mod course;
pub mod document;
pub mod email;
pub mod password;
pub mod payment;
pub mod rate_limiter;
pub mod scholarship;
pub mod subscription;
pub mod support;
pub mod token;
pub mod university;
pub mod user;
pub mod validation;

pub use application::{
    ApplicationDetail, ApplicationService, ApplicationStats, CreateApplicationInput,
};
pub use blog::{
    excerpt, generate_slug, reading_time, render_markdown, BlogService, CreatePostInput,
    PostDetail, UpdatePostInput,
};
pub use chat::{ChatReply, ChatResponder, ChatService, ConversationDetail, KeywordResponder};
pub use consultation::{BookConsultationInput, ConsultationService};
pub use course::{CourseService, CreateCourseInput};
pub use document::{DocumentService, UploadInput};
pub use email::EmailService;
pub use password::{generate_reset_token, hash_password, hash_reset_token, verify_password};
pub use payment::{
    CreatePaymentInput, PaymentCreated, PaymentService, VerifyOutcome, VerifyPaymentInput,
};
pub use rate_limiter::RateLimiter;
pub use scholarship::{CreateScholarshipInput, ScholarshipMatch, ScholarshipService};
pub use subscription::{
    CreateSubscriptionInput, CurrentSubscription, SubscriptionCreated, SubscriptionService,
};
pub use support::{CreateTicketInput, SupportService, TicketDetail};
pub use token::{Claims, TokenService};
pub use university::{
    ProgramInput, ProgramRequirements, UniversityDetail, UniversityInput, UniversityListing,
    UniversityService,
};
pub use user::{AuthSession, LoginInput, ProfileUpdate, RegisterInput, UserProfile, UserService};
pub use validation::{
    parse_uuid, sanitize_html, sanitize_text, uuid_field, FieldError, PageMeta, Pagination,
    Validator,
};

use serde_json::Value;

/// Business-rule failure with a stable machine-readable code
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },

    #[error("{message}")]
    PaymentRequired { code: &'static str, message: String },

    #[error("{message}")]
    Forbidden {
        code: &'static str,
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("{message}")]
    TooManyRequests { code: &'static str, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn payment_required(code: &'static str, message: impl Into<String>) -> Self {
        Self::PaymentRequired {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden_with(code: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn too_many_requests(code: &'static str, message: impl Into<String>) -> Self {
        Self::TooManyRequests {
            code,
            message: message.into(),
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::BadRequest { code, .. }
            | Self::Unauthorized { code, .. }
            | Self::PaymentRequired { code, .. }
            | Self::Forbidden { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::TooManyRequests { code, .. } => *code,
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
