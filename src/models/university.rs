use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// University in the catalogue
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct University {
    pub id: String,
    pub name: String,
    pub country: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub ranking: Option<i32>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub tuition_min: Option<f64>,
    pub tuition_max: Option<f64>,
    pub acceptance_rate: Option<f64>,
    pub has_scholarship: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl University {
    pub fn new(name: String, country: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            country,
            city: None,
            region: None,
            ranking: None,
            description: None,
            website: None,
            logo_url: None,
            tuition_min: None,
            tuition_max: None,
            acceptance_rate: None,
            has_scholarship: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Degree program offered by a university
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub university_id: String,
    pub name: String,
    pub degree_level: String,
    pub field: Option<String>,
    pub duration: Option<String>,
    pub tuition_fee: Option<f64>,
    pub currency: String,
    pub language: Option<String>,
    pub intake: Option<String>,
    pub requirements: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Program {
    pub fn new(university_id: String, name: String, degree_level: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            university_id,
            name,
            degree_level,
            field: None,
            duration: None,
            tuition_fee: None,
            currency: "USD".to_string(),
            language: None,
            intake: None,
            requirements: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Program row joined with its university's name and country
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProgramWithUniversity {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub program: Program,
    pub university_name: String,
    pub university_country: String,
}
