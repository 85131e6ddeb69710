//! University applications
//!
//! Submission is gated by the tier's application limit, counted over every
//! application the user has ever made.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::email::EmailService;
use super::validation::{sanitize_opt, uuid_field, PageMeta, Pagination, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::{ApplicationRepository, UniversityRepository, UserRepository};
use crate::models::{
    Application, ApplicationLimit, ApplicationStatus, ApplicationView, Document,
    SubscriptionTier, User,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationInput {
    pub university_id: Option<String>,
    pub program_id: Option<String>,
    pub personal_statement: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub limit: ApplicationLimit,
    pub remaining: Option<i64>,
    pub current_plan: SubscriptionTier,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: ApplicationView,
    pub documents: Vec<Document>,
}

pub struct ApplicationService {
    applications: Arc<dyn ApplicationRepository>,
    universities: Arc<dyn UniversityRepository>,
    users: Arc<dyn UserRepository>,
    email: Arc<EmailService>,
}

impl ApplicationService {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        universities: Arc<dyn UniversityRepository>,
        users: Arc<dyn UserRepository>,
        email: Arc<EmailService>,
    ) -> Self {
        Self {
            applications,
            universities,
            users,
            email,
        }
    }

    pub async fn create(
        &self,
        user: &User,
        input: CreateApplicationInput,
    ) -> ServiceResult<Application> {
        let mut v = Validator::new();
        v.required("universityId", input.university_id.as_deref());
        if let Some(statement) = input.personal_statement.as_deref() {
            v.max_len("personalStatement", statement, 10_000);
        }
        v.finish()?;

        let tier = user.effective_tier(Utc::now());
        let limit = tier.features().applications;
        let used = self.applications.count_for_user(&user.id).await?;
        if !limit.allows(used) {
            return Err(ServiceError::forbidden_with(
                "APPLICATION_LIMIT_REACHED",
                "Application limit reached for your current plan. Upgrade to apply to more universities.",
                json!({ "limit": limit, "used": used, "currentPlan": tier }),
            ));
        }

        let university_id =
            uuid_field("universityId", input.university_id.as_deref().unwrap_or_default())?;
        let university = self
            .universities
            .get_by_id(&university_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("UNIVERSITY_NOT_FOUND", "University not found"))?;

        let program = match input.program_id.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => {
                let program_id = uuid_field("programId", raw)?;
                let program = self
                    .universities
                    .get_program(&program_id)
                    .await?
                    .filter(|p| p.university_id == university.id)
                    .ok_or_else(|| ServiceError::not_found("PROGRAM_NOT_FOUND", "Program not found"))?;
                Some(program)
            }
            None => None,
        };

        let program_id = program.as_ref().map(|p| p.id.as_str());
        if self
            .applications
            .exists(&user.id, &university.id, program_id)
            .await?
        {
            return Err(ServiceError::conflict(
                "DUPLICATE_APPLICATION",
                "You have already applied to this program",
            ));
        }

        let mut application =
            Application::new(user.id.clone(), university.id.clone(), program_id.map(String::from));
        application.personal_statement = sanitize_opt(input.personal_statement.as_deref());
        application.notes = sanitize_opt(input.notes.as_deref());
        let application = self.applications.create(&application).await?;

        if tier == SubscriptionTier::Free {
            self.users.increment_free_applications(&user.id).await?;
        }

        tracing::info!(
            "User {} applied to {} ({})",
            user.id,
            university.name,
            application.id
        );
        self.email.send_application_submitted(
            user,
            &university.name,
            program.as_ref().map(|p| p.name.as_str()),
        );

        Ok(application)
    }

    pub async fn list(
        &self,
        user_id: &str,
        status: Option<&str>,
        page: Pagination,
    ) -> ServiceResult<(Vec<ApplicationView>, PageMeta)> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let mut v = Validator::new();
                v.one_of("status", raw, &ApplicationStatus::names());
                v.finish()?;
                raw.parse::<ApplicationStatus>().ok()
            }
            None => None,
        };
        let result = self
            .applications
            .list_for_user(user_id, status, page.limit, page.offset())
            .await?;
        Ok((result.items, page.meta(result.total)))
    }

    pub async fn stats(&self, user: &User) -> ServiceResult<ApplicationStats> {
        let by_status: BTreeMap<String, i64> = ApplicationStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .chain(self.applications.count_by_status(&user.id).await?)
            .collect();
        let total = by_status.values().sum();
        let tier = user.effective_tier(Utc::now());
        let limit = tier.features().applications;

        Ok(ApplicationStats {
            total,
            by_status,
            limit,
            remaining: limit.remaining(total),
            current_plan: tier,
        })
    }

    pub async fn detail(&self, user_id: &str, id: &str) -> ServiceResult<ApplicationDetail> {
        let application = self
            .applications
            .get_view_for_user(id, user_id)
            .await?
            .ok_or_else(not_found)?;
        let documents = self.applications.list_documents_for_application(id).await?;
        Ok(ApplicationDetail {
            application,
            documents,
        })
    }

    pub async fn withdraw(&self, user_id: &str, id: &str) -> ServiceResult<Application> {
        let mut application = self
            .applications
            .get_by_id(id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(not_found)?;
        if !application.status.can_withdraw() {
            return Err(ServiceError::bad_request(
                "CANNOT_WITHDRAW",
                "Only pending or under-review applications can be withdrawn",
            ));
        }
        self.applications
            .update_status(id, ApplicationStatus::Withdrawn)
            .await?;
        application.status = ApplicationStatus::Withdrawn;
        Ok(application)
    }

    /// Admin decision; any status is accepted
    pub async fn set_status(&self, id: &str, status: Option<&str>) -> ServiceResult<Application> {
        let raw = status.unwrap_or_default();
        let mut v = Validator::new();
        v.required("status", status).one_of("status", raw, &ApplicationStatus::names());
        v.finish()?;
        let status: ApplicationStatus = raw
            .parse()
            .map_err(|_| ServiceError::invalid_field("status", "Unknown status"))?;

        if !self.applications.update_status(id, status).await? {
            return Err(not_found());
        }
        self.applications
            .get_by_id(id)
            .await?
            .ok_or_else(not_found)
    }
}

fn not_found() -> ServiceError {
    ServiceError::not_found("APPLICATION_NOT_FOUND", "Application not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxApplicationRepository, SqlxUniversityRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Program, University};
    use chrono::Duration;

    struct Fixture {
        service: ApplicationService,
        users: Arc<dyn UserRepository>,
        universities: Arc<dyn UniversityRepository>,
        student: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let universities = SqlxUniversityRepository::boxed(pool.clone());
        let service = ApplicationService::new(
            SqlxApplicationRepository::boxed(pool),
            universities.clone(),
            users.clone(),
            Arc::new(EmailService::disabled("http://localhost:3000").unwrap()),
        );
        let student = User::new("s@example.com".into(), "h".into(), "S".into());
        users.create(&student).await.unwrap();
        Fixture {
            service,
            users,
            universities,
            student,
        }
    }

    async fn university(f: &Fixture, name: &str) -> University {
        f.universities
            .create(&University::new(name.into(), "Japan".into()))
            .await
            .unwrap()
    }

    fn apply_to(university: &University, program: Option<&Program>) -> CreateApplicationInput {
        CreateApplicationInput {
            university_id: Some(university.id.clone()),
            program_id: program.map(|p| p.id.clone()),
            personal_statement: Some("I <3 research".into()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_free_tier_limit() {
        let f = setup().await;
        for i in 0..3 {
            let uni = university(&f, &format!("Uni {}", i)).await;
            f.service.create(&f.student, apply_to(&uni, None)).await.unwrap();
        }
        let user = f.users.get_by_id(&f.student.id).await.unwrap().unwrap();
        assert_eq!(user.free_applications_used, 3);

        let fourth = university(&f, "Uni 4").await;
        let err = f.service.create(&user, apply_to(&fourth, None)).await.unwrap_err();
        match err {
            ServiceError::Forbidden { code, details, .. } => {
                assert_eq!(code, "APPLICATION_LIMIT_REACHED");
                let details = details.unwrap();
                assert_eq!(details["limit"], 3);
                assert_eq!(details["used"], 3);
                assert_eq!(details["currentPlan"], "free");
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut global = user.clone();
        global.subscription_type = SubscriptionTier::Global;
        global.subscription_expires_at = Some(Utc::now() + Duration::days(30));
        f.service.create(&global, apply_to(&fourth, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_and_program_checks() {
        let f = setup().await;
        let uni = university(&f, "Osaka").await;
        let other = university(&f, "Nagoya").await;
        let program = f
            .universities
            .create_program(&Program::new(other.id.clone(), "BSc".into(), "bachelor".into()))
            .await
            .unwrap();

        let err = f
            .service
            .create(&f.student, apply_to(&uni, Some(&program)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PROGRAM_NOT_FOUND");

        let created = f.service.create(&f.student, apply_to(&uni, None)).await.unwrap();
        assert_eq!(created.personal_statement.as_deref(), Some("I &lt;3 research"));
        let err = f.service.create(&f.student, apply_to(&uni, None)).await.unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_APPLICATION");

        f.service
            .create(&f.student, apply_to(&other, Some(&program)))
            .await
            .unwrap();

        let missing = CreateApplicationInput {
            university_id: Some(uuid::Uuid::new_v4().to_string()),
            ..Default::default()
        };
        let err = f.service.create(&f.student, missing).await.unwrap_err();
        assert_eq!(err.code(), "UNIVERSITY_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_withdraw_stats_and_status() {
        let f = setup().await;
        let uni = university(&f, "Tohoku").await;
        let app = f.service.create(&f.student, apply_to(&uni, None)).await.unwrap();

        let detail = f.service.detail(&f.student.id, &app.id).await.unwrap();
        assert_eq!(detail.application.university_name, "Tohoku");
        assert!(detail.documents.is_empty());
        let err = f.service.detail("someone-else", &app.id).await.unwrap_err();
        assert_eq!(err.code(), "APPLICATION_NOT_FOUND");

        let withdrawn = f.service.withdraw(&f.student.id, &app.id).await.unwrap();
        assert_eq!(withdrawn.status, ApplicationStatus::Withdrawn);
        let err = f.service.withdraw(&f.student.id, &app.id).await.unwrap_err();
        assert_eq!(err.code(), "CANNOT_WITHDRAW");

        let stats = f.service.stats(&f.student).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_status["withdrawn"], 1);
        assert_eq!(stats.by_status["pending"], 0);
        assert_eq!(stats.remaining, Some(2));

        let accepted = f.service.set_status(&app.id, Some("accepted")).await.unwrap();
        assert_eq!(accepted.status, ApplicationStatus::Accepted);
        let err = f.service.set_status(&app.id, Some("lost")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let (items, meta) = f
            .service
            .list(&f.student.id, Some("accepted"), Pagination { page: 1, limit: 10 })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(meta.total, 1);
    }
}
