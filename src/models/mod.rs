//! Data models
//!
//! Database entities and the small enums stored alongside them. Rows are
//! decoded with `sqlx::FromRow`; enums are persisted as lowercase strings
//! and serialized the same way in API responses.

/// Declares a fieldless enum persisted as a lowercase string.
///
/// Generates `as_str`, `ALL`, `Display`, `FromStr`, `TryFrom<String>` (used
/// by `#[sqlx(try_from = "String")]`) and string-based serde impls.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Accepted spellings, for validation messages
            pub fn names() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::models::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::models::ParseEnumError {
                        kind: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::ParseEnumError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                raw.parse().map_err(::serde::de::Error::custom)
            }
        }
    };
}

mod application;
mod blog;
mod chat;
mod consultation;
mod course;
mod payment;
mod scholarship;
mod subscription;
mod support;
mod university;
mod user;

pub use application::{Application, ApplicationStatus, ApplicationView, Document};
pub use blog::{BlogPost, PostStatus, Term, TermWithCount};
pub use chat::{ChatMessage, ChatRole, Conversation, ConversationSummary};
pub use consultation::{Consultation, ConsultationStatus, ConsultationType};
pub use course::{Course, CourseType, Enrollment, EnrollmentView};
pub use payment::{Payment, PaymentStatus, PaymentWithPlan};
pub use scholarship::{Scholarship, ScholarshipApplication};
pub use subscription::{
    AiSupport, ApplicationLimit, PaymentMethod, Plan, PlanFeatures, Subscription,
    SubscriptionStatus, SubscriptionTier, UniversityAccess, plan_expiry, PLAN_VALIDITY_YEARS,
};
pub use support::{
    SupportTicket, TicketCategory, TicketMessage, TicketMessageView, TicketPriority, TicketStatus,
    TicketSummary,
};
pub use university::{Program, ProgramWithUniversity, University};
pub use user::{User, UserRole, PROFILE_FIELDS};

/// Error returned when a stored or submitted value is not a known enum variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// One page of rows plus the unpaginated total
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
}
