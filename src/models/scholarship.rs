use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Scholarship {
    pub id: String,
    pub name: String,
    pub provider: Option<String>,
    /// Country of study, or "Global"
    pub country: String,
    pub degree_level: Option<String>,
    pub amount: Option<f64>,
    pub currency: String,
    pub deadline: Option<NaiveDate>,
    pub description: Option<String>,
    pub eligibility: Option<String>,
    pub url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Scholarship {
    pub fn new(name: String, country: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            provider: None,
            country,
            degree_level: None,
            amount: None,
            currency: "USD".to_string(),
            deadline: None,
            description: None,
            eligibility: None,
            url: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Open for applications on `today`
    pub fn is_open(&self, today: NaiveDate) -> bool {
        self.is_active && self.deadline.map(|d| d >= today).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScholarshipApplication {
    pub id: String,
    pub user_id: String,
    pub scholarship_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl ScholarshipApplication {
    pub fn new(user_id: String, scholarship_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            scholarship_id,
            status: "submitted".to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_open() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mut s = Scholarship::new("Chevening".into(), "UK".into());
        assert!(s.is_open(today));

        s.deadline = NaiveDate::from_ymd_opt(2025, 3, 1);
        assert!(s.is_open(today));

        s.deadline = NaiveDate::from_ymd_opt(2025, 2, 28);
        assert!(!s.is_open(today));

        s.deadline = None;
        s.is_active = false;
        assert!(!s.is_open(today));
    }
}
