//! Scholarship catalogue and matching

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::{sanitize_opt, sanitize_text, PageMeta, Pagination, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::{ScholarshipFilter, ScholarshipRepository};
use crate::models::{Scholarship, ScholarshipApplication, User};

const BASE_SCORE: u8 = 50;
const COUNTRY_BONUS: u8 = 30;
const LEVEL_BONUS: u8 = 20;
const MAX_MATCHES: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScholarshipInput {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub country: Option<String>,
    pub degree_level: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    /// `YYYY-MM-DD`
    pub deadline: Option<String>,
    pub description: Option<String>,
    pub eligibility: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScholarshipMatch {
    pub scholarship: Scholarship,
    pub match_score: u8,
    pub reasons: Vec<String>,
}

/// Score one candidate against the user's country and academic level
pub fn score_match(scholarship: &Scholarship, user: &User) -> ScholarshipMatch {
    let mut score = BASE_SCORE;
    let mut reasons = Vec::new();

    let country_match = user
        .country
        .as_deref()
        .is_some_and(|c| c.eq_ignore_ascii_case(&scholarship.country));
    if country_match {
        score += COUNTRY_BONUS;
        reasons.push("Country match".to_string());
    }

    let level_match = match (&scholarship.degree_level, &user.academic_level) {
        (Some(wanted), Some(held)) => wanted.eq_ignore_ascii_case(held),
        _ => false,
    };
    if level_match {
        score += LEVEL_BONUS;
        reasons.push("Academic level match".to_string());
    }

    if let Some(deadline) = scholarship.deadline {
        reasons.push(format!("Deadline: {}", deadline));
    }

    ScholarshipMatch {
        scholarship: scholarship.clone(),
        match_score: score.min(100),
        reasons,
    }
}

pub struct ScholarshipService {
    repo: Arc<dyn ScholarshipRepository>,
}

impl ScholarshipService {
    pub fn new(repo: Arc<dyn ScholarshipRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        filter: &ScholarshipFilter,
        page: Pagination,
    ) -> ServiceResult<(Vec<Scholarship>, PageMeta)> {
        let today = Utc::now().date_naive();
        let result = self
            .repo
            .list_open(filter, today, page.limit, page.offset())
            .await?;
        Ok((result.items, page.meta(result.total)))
    }

    pub async fn get(&self, id: &str) -> ServiceResult<Scholarship> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("SCHOLARSHIP_NOT_FOUND", "Scholarship not found"))
    }

    /// Best open scholarships for `user`, highest score first
    pub async fn auto_match(&self, user: &User) -> ServiceResult<Vec<ScholarshipMatch>> {
        let today = Utc::now().date_naive();
        let country = user.country.as_deref().unwrap_or("Global");
        let candidates = self
            .repo
            .match_candidates(country, user.academic_level.as_deref(), today)
            .await?;

        let mut matches: Vec<ScholarshipMatch> =
            candidates.iter().map(|s| score_match(s, user)).collect();
        matches.sort_by(|a, b| {
            b.match_score.cmp(&a.match_score).then_with(|| {
                let a = a.scholarship.deadline.unwrap_or(NaiveDate::MAX);
                let b = b.scholarship.deadline.unwrap_or(NaiveDate::MAX);
                a.cmp(&b)
            })
        });
        matches.truncate(MAX_MATCHES);
        Ok(matches)
    }

    pub async fn apply(&self, user_id: &str, id: &str) -> ServiceResult<ScholarshipApplication> {
        let scholarship = self.get(id).await?;
        if !scholarship.is_open(Utc::now().date_naive()) {
            return Err(ServiceError::bad_request(
                "SCHOLARSHIP_CLOSED",
                "This scholarship is no longer accepting applications",
            ));
        }
        if self.repo.has_applied(user_id, id).await? {
            return Err(ServiceError::conflict(
                "ALREADY_APPLIED",
                "You have already applied for this scholarship",
            ));
        }
        let application = ScholarshipApplication::new(user_id.to_string(), scholarship.id);
        self.repo.create_application(&application).await?;
        Ok(application)
    }

    pub async fn create(&self, input: CreateScholarshipInput) -> ServiceResult<Scholarship> {
        let mut v = Validator::new();
        v.required("name", input.name.as_deref())
            .required("country", input.country.as_deref());
        if let Some(amount) = input.amount {
            if amount < 0.0 {
                v.error("amount", "Must not be negative");
            }
        }
        let deadline = match input.deadline.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    v.error("deadline", "Must be a date in YYYY-MM-DD format");
                    None
                }
            },
            None => None,
        };
        v.finish()?;

        let mut scholarship = Scholarship::new(
            sanitize_text(input.name.as_deref().unwrap_or_default()),
            sanitize_text(input.country.as_deref().unwrap_or_default()),
        );
        scholarship.provider = sanitize_opt(input.provider.as_deref());
        scholarship.degree_level = input
            .degree_level
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());
        scholarship.amount = input.amount;
        if let Some(currency) = input.currency.filter(|c| !c.trim().is_empty()) {
            scholarship.currency = currency.trim().to_uppercase();
        }
        scholarship.deadline = deadline;
        scholarship.description = sanitize_opt(input.description.as_deref());
        scholarship.eligibility = sanitize_opt(input.eligibility.as_deref());
        scholarship.url = input.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());

        Ok(self.repo.create(&scholarship).await?)
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.repo.delete(id).await? {
            return Err(ServiceError::not_found(
                "SCHOLARSHIP_NOT_FOUND",
                "Scholarship not found",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxScholarshipRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use chrono::Duration;

    async fn setup_with_pool() -> (ScholarshipService, DynDatabasePool) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        (ScholarshipService::new(SqlxScholarshipRepository::boxed(pool.clone())), pool)
    }

    async fn setup() -> ScholarshipService {
        setup_with_pool().await.0
    }

    fn input(name: &str, country: &str, level: Option<&str>, deadline: Option<NaiveDate>) -> CreateScholarshipInput {
        CreateScholarshipInput {
            name: Some(name.into()),
            country: Some(country.into()),
            degree_level: level.map(String::from),
            deadline: deadline.map(|d| d.format("%Y-%m-%d").to_string()),
            ..Default::default()
        }
    }

    fn student(country: &str, level: &str) -> User {
        let mut user = User::new("s@example.com".into(), "h".into(), "S".into());
        user.country = Some(country.into());
        user.academic_level = Some(level.into());
        user
    }

    #[test]
    fn test_score_match() {
        let user = student("Japan", "master");
        let mut s = Scholarship::new("MEXT".into(), "Japan".into());
        s.degree_level = Some("Master".into());
        let m = score_match(&s, &user);
        assert_eq!(m.match_score, 100);
        assert_eq!(m.reasons, vec!["Country match", "Academic level match"]);

        let global = Scholarship::new("Fulbright".into(), "Global".into());
        let m = score_match(&global, &user);
        assert_eq!(m.match_score, 50);
        assert!(m.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_auto_match_ranking() {
        let service = setup().await;
        let soon = Utc::now().date_naive() + Duration::days(10);
        let later = Utc::now().date_naive() + Duration::days(40);
        let past = Utc::now().date_naive() - Duration::days(1);

        service.create(input("Global Later", "Global", None, Some(later))).await.unwrap();
        service.create(input("Global Soon", "Global", None, Some(soon))).await.unwrap();
        service.create(input("Japan Master", "Japan", Some("master"), None)).await.unwrap();
        service.create(input("Japan PhD", "Japan", Some("phd"), None)).await.unwrap();
        service.create(input("Korea", "Korea", None, None)).await.unwrap();
        service.create(input("Expired", "Japan", None, Some(past))).await.unwrap();

        let matches = service.auto_match(&student("Japan", "master")).await.unwrap();
        let names: Vec<&str> = matches.iter().map(|m| m.scholarship.name.as_str()).collect();
        assert_eq!(names, vec!["Japan Master", "Global Soon", "Global Later"]);
        assert_eq!(matches[0].match_score, 100);
        assert!(matches[1].reasons[0].starts_with("Deadline: "));
    }

    #[tokio::test]
    async fn test_apply_once() {
        let (service, pool) = setup_with_pool().await;
        let user = student("Germany", "master");
        SqlxUserRepository::boxed(pool).create(&user).await.unwrap();

        let s = service.create(input("Erasmus", "Global", None, None)).await.unwrap();
        service.apply(&user.id, &s.id).await.unwrap();
        let err = service.apply(&user.id, &s.id).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_APPLIED");

        service.delete(&s.id).await.unwrap();
        let err = service.apply(&user.id, &s.id).await.unwrap_err();
        assert_eq!(err.code(), "SCHOLARSHIP_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let service = setup().await;
        let err = service
            .create(CreateScholarshipInput {
                deadline: Some("next week".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
