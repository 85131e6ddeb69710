use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Lifecycle of a university application
    pub enum ApplicationStatus {
        Pending => "pending",
        UnderReview => "under_review",
        Accepted => "accepted",
        Rejected => "rejected",
        Withdrawn => "withdrawn",
    }
}

impl ApplicationStatus {
    /// Only applications still awaiting a decision can be withdrawn
    pub fn can_withdraw(&self) -> bool {
        matches!(self, ApplicationStatus::Pending | ApplicationStatus::UnderReview)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub user_id: String,
    pub university_id: String,
    pub program_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ApplicationStatus,
    pub personal_statement: Option<String>,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(user_id: String, university_id: String, program_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            university_id,
            program_id,
            status: ApplicationStatus::Pending,
            personal_statement: None,
            notes: None,
            submitted_at: now,
            updated_at: now,
        }
    }
}

/// Application joined with the names shown in listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub application: Application,
    pub university_name: String,
    pub university_country: String,
    pub program_name: Option<String>,
}

/// Uploaded supporting document
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub application_id: Option<String>,
    pub document_type: String,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdrawable_states() {
        assert!(ApplicationStatus::Pending.can_withdraw());
        assert!(ApplicationStatus::UnderReview.can_withdraw());
        assert!(!ApplicationStatus::Accepted.can_withdraw());
        assert!(!ApplicationStatus::Rejected.can_withdraw());
        assert!(!ApplicationStatus::Withdrawn.can_withdraw());
    }

    #[test]
    fn test_view_flattens_application() {
        let view = ApplicationView {
            application: Application::new("u".into(), "uni".into(), None),
            university_name: "Oxford".into(),
            university_country: "UK".into(),
            program_name: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["universityName"], "Oxford");
        assert!(json["programId"].is_null());
    }
}
