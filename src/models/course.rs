use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum CourseType {
        Language => "language",
        TestPrep => "test_prep",
        Skills => "skills",
    }
}

/// Preparation course (language, test prep, study skills)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub course_type: CourseType,
    pub level: Option<String>,
    pub duration: Option<String>,
    pub price: f64,
    pub currency: String,
    pub instructor: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Course {
    pub fn new(title: String, course_type: CourseType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description: None,
            course_type,
            level: None,
            duration: None,
            price: 0.0,
            currency: "USD".to_string(),
            instructor: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub progress: i32,
    pub status: String,
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn new(user_id: String, course_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            course_id,
            progress: 0,
            status: "active".to_string(),
            enrolled_at: Utc::now(),
        }
    }
}

/// Enrollment joined with course details
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course_title: String,
    #[sqlx(try_from = "String")]
    pub course_type: CourseType,
}
