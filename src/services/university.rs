//! University and program catalogue
//!
//! Anonymous and free-tier callers get a capped listing; everything else is
//! open. Writes are admin-only (enforced by the router).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::{sanitize_opt, sanitize_text, PageMeta, Pagination, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::{CountryCount, ProgramFilter, UniversityFilter, UniversityRepository};
use crate::models::{Program, ProgramWithUniversity, SubscriptionTier, University, UniversityAccess};

/// Page size cap for callers with limited university access
pub const LIMITED_PAGE_SIZE: i64 = 5;

const GENERAL_DOCUMENTS: [&str; 6] = [
    "Valid passport",
    "Academic transcripts",
    "Degree or school-leaving certificate",
    "Statement of purpose",
    "Letters of recommendation",
    "English proficiency test results (IELTS/TOEFL)",
];

/// Create or partially update a university
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityInput {
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub ranking: Option<i32>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub tuition_min: Option<f64>,
    pub tuition_max: Option<f64>,
    pub acceptance_rate: Option<f64>,
    pub has_scholarship: Option<bool>,
}

impl UniversityInput {
    fn validate(&self, creating: bool) -> ServiceResult<()> {
        let mut v = Validator::new();
        if creating || self.name.is_some() {
            v.required("name", self.name.as_deref());
        }
        if creating || self.country.is_some() {
            v.required("country", self.country.as_deref());
        }
        if let Some(name) = &self.name {
            v.max_len("name", name, 200);
        }
        if let Some(ranking) = self.ranking {
            v.range("ranking", ranking, 1, 100_000);
        }
        if let Some(rate) = self.acceptance_rate {
            v.range("acceptanceRate", rate, 0.0, 100.0);
        }
        if let (Some(min), Some(max)) = (self.tuition_min, self.tuition_max) {
            if min > max {
                v.error("tuitionMin", "Must not exceed tuitionMax");
            }
        }
        v.finish()
    }

    fn apply(self, university: &mut University) {
        if let Some(name) = self.name {
            university.name = sanitize_text(&name);
        }
        if let Some(country) = self.country {
            university.country = sanitize_text(&country);
        }
        if let Some(city) = self.city {
            university.city = sanitize_opt(Some(&city));
        }
        if let Some(region) = self.region {
            university.region = sanitize_opt(Some(&region));
        }
        if let Some(ranking) = self.ranking {
            university.ranking = Some(ranking);
        }
        if let Some(description) = self.description {
            university.description = sanitize_opt(Some(&description));
        }
        if let Some(website) = self.website {
            university.website = Some(website.trim().to_string()).filter(|w| !w.is_empty());
        }
        if let Some(logo) = self.logo_url {
            university.logo_url = Some(logo.trim().to_string()).filter(|l| !l.is_empty());
        }
        if let Some(min) = self.tuition_min {
            university.tuition_min = Some(min);
        }
        if let Some(max) = self.tuition_max {
            university.tuition_max = Some(max);
        }
        if let Some(rate) = self.acceptance_rate {
            university.acceptance_rate = Some(rate);
        }
        if let Some(has) = self.has_scholarship {
            university.has_scholarship = has;
        }
    }
}

/// Create or partially update a program
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramInput {
    pub university_id: Option<String>,
    pub name: Option<String>,
    pub degree_level: Option<String>,
    pub field: Option<String>,
    pub duration: Option<String>,
    pub tuition_fee: Option<f64>,
    pub currency: Option<String>,
    pub language: Option<String>,
    pub intake: Option<String>,
    pub requirements: Option<String>,
    pub description: Option<String>,
}

impl ProgramInput {
    fn validate(&self, creating: bool) -> ServiceResult<()> {
        let mut v = Validator::new();
        if creating {
            v.required("universityId", self.university_id.as_deref());
        }
        if creating || self.name.is_some() {
            v.required("name", self.name.as_deref());
        }
        if creating || self.degree_level.is_some() {
            v.required("degreeLevel", self.degree_level.as_deref());
        }
        if let Some(fee) = self.tuition_fee {
            if fee < 0.0 {
                v.error("tuitionFee", "Must not be negative");
            }
        }
        v.finish()
    }

    fn apply(self, program: &mut Program) {
        if let Some(name) = self.name {
            program.name = sanitize_text(&name);
        }
        if let Some(level) = self.degree_level {
            program.degree_level = level.trim().to_lowercase();
        }
        if let Some(field) = self.field {
            program.field = sanitize_opt(Some(&field));
        }
        if let Some(duration) = self.duration {
            program.duration = sanitize_opt(Some(&duration));
        }
        if let Some(fee) = self.tuition_fee {
            program.tuition_fee = Some(fee);
        }
        if let Some(currency) = self.currency {
            program.currency = currency.trim().to_uppercase();
        }
        if let Some(language) = self.language {
            program.language = sanitize_opt(Some(&language));
        }
        if let Some(intake) = self.intake {
            program.intake = sanitize_opt(Some(&intake));
        }
        if let Some(requirements) = self.requirements {
            program.requirements = sanitize_opt(Some(&requirements));
        }
        if let Some(description) = self.description {
            program.description = sanitize_opt(Some(&description));
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityListing {
    pub universities: Vec<University>,
    pub pagination: PageMeta,
    pub limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityDetail {
    #[serde(flatten)]
    pub university: University,
    pub programs: Vec<Program>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRequirements {
    pub program_id: String,
    pub program_name: String,
    pub requirements: Option<String>,
    pub general_documents: Vec<&'static str>,
}

pub struct UniversityService {
    repo: Arc<dyn UniversityRepository>,
}

impl UniversityService {
    pub fn new(repo: Arc<dyn UniversityRepository>) -> Self {
        Self { repo }
    }

    /// Listing for a caller holding `tier` (`None` when anonymous)
    pub async fn list(
        &self,
        filter: &UniversityFilter,
        page: Pagination,
        tier: Option<SubscriptionTier>,
    ) -> ServiceResult<UniversityListing> {
        let limited = tier.unwrap_or_default().features().universities == UniversityAccess::Limited;
        let page = if limited {
            Pagination {
                page: page.page,
                limit: page.limit.min(LIMITED_PAGE_SIZE),
            }
        } else {
            page
        };

        let result = self.repo.list(filter, page.limit, page.offset()).await?;
        Ok(UniversityListing {
            universities: result.items,
            pagination: page.meta(result.total),
            limited,
            notice: limited.then(|| {
                "Limited results for free tier. Upgrade to see more universities.".to_string()
            }),
        })
    }

    pub async fn countries(&self) -> ServiceResult<Vec<CountryCount>> {
        Ok(self.repo.countries().await?)
    }

    pub async fn get(&self, id: &str) -> ServiceResult<University> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("UNIVERSITY_NOT_FOUND", "University not found"))
    }

    pub async fn detail(&self, id: &str) -> ServiceResult<UniversityDetail> {
        let university = self.get(id).await?;
        let programs = self.repo.programs_for_university(id).await?;
        Ok(UniversityDetail {
            university,
            programs,
        })
    }

    pub async fn create(&self, input: UniversityInput) -> ServiceResult<University> {
        input.validate(true)?;
        let mut university = University::new(String::new(), String::new());
        input.apply(&mut university);
        let university = self.repo.create(&university).await?;
        tracing::info!("Created university {} ({})", university.id, university.name);
        Ok(university)
    }

    pub async fn update(&self, id: &str, input: UniversityInput) -> ServiceResult<University> {
        input.validate(false)?;
        let mut university = self.get(id).await?;
        input.apply(&mut university);
        if let (Some(min), Some(max)) = (university.tuition_min, university.tuition_max) {
            if min > max {
                return Err(ServiceError::invalid_field("tuitionMin", "Must not exceed tuitionMax"));
            }
        }
        Ok(self.repo.update(&university).await?)
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.repo.delete(id).await? {
            return Err(ServiceError::not_found("UNIVERSITY_NOT_FOUND", "University not found"));
        }
        Ok(())
    }

    pub async fn list_programs(
        &self,
        filter: &ProgramFilter,
        page: Pagination,
    ) -> ServiceResult<(Vec<ProgramWithUniversity>, PageMeta)> {
        let result = self.repo.list_programs(filter, page.limit, page.offset()).await?;
        Ok((result.items, page.meta(result.total)))
    }

    pub async fn get_program(&self, id: &str) -> ServiceResult<ProgramWithUniversity> {
        self.repo
            .get_program_view(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("PROGRAM_NOT_FOUND", "Program not found"))
    }

    pub async fn requirements(&self, id: &str) -> ServiceResult<ProgramRequirements> {
        let program = self
            .repo
            .get_program(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("PROGRAM_NOT_FOUND", "Program not found"))?;
        Ok(ProgramRequirements {
            program_id: program.id,
            program_name: program.name,
            requirements: program.requirements,
            general_documents: GENERAL_DOCUMENTS.to_vec(),
        })
    }

    pub async fn create_program(&self, input: ProgramInput) -> ServiceResult<Program> {
        input.validate(true)?;
        let university_id = input.university_id.clone().unwrap_or_default();
        let university = self.get(university_id.trim()).await?;

        let mut program = Program::new(university.id, String::new(), String::new());
        input.apply(&mut program);
        Ok(self.repo.create_program(&program).await?)
    }

    pub async fn update_program(&self, id: &str, input: ProgramInput) -> ServiceResult<Program> {
        input.validate(false)?;
        let mut program = self
            .repo
            .get_program(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("PROGRAM_NOT_FOUND", "Program not found"))?;
        if let Some(university_id) = input.university_id.as_deref() {
            program.university_id = self.get(university_id.trim()).await?.id;
        }
        input.apply(&mut program);
        Ok(self.repo.update_program(&program).await?)
    }

    pub async fn delete_program(&self, id: &str) -> ServiceResult<()> {
        if !self.repo.delete_program(id).await? {
            return Err(ServiceError::not_found("PROGRAM_NOT_FOUND", "Program not found"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUniversityRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> UniversityService {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        UniversityService::new(SqlxUniversityRepository::boxed(pool))
    }

    fn uni(name: &str, country: &str, ranking: i32) -> UniversityInput {
        UniversityInput {
            name: Some(name.into()),
            country: Some(country.into()),
            ranking: Some(ranking),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_free_tier_listing_is_capped() {
        let service = setup().await;
        for i in 1..=8 {
            service.create(uni(&format!("Uni {}", i), "Japan", i)).await.unwrap();
        }
        let page = Pagination { page: 1, limit: 10 };

        let anonymous = service.list(&UniversityFilter::default(), page, None).await.unwrap();
        assert!(anonymous.limited);
        assert_eq!(anonymous.universities.len(), 5);
        assert_eq!(anonymous.pagination.limit, 5);
        assert_eq!(anonymous.pagination.total, 8);
        assert!(anonymous.notice.is_some());

        let paid = service
            .list(&UniversityFilter::default(), page, Some(SubscriptionTier::Asia))
            .await
            .unwrap();
        assert!(!paid.limited);
        assert_eq!(paid.universities.len(), 8);
        assert_eq!(paid.universities[0].ranking, Some(1));
    }

    #[tokio::test]
    async fn test_create_validation_and_sanitizing() {
        let service = setup().await;
        let err = service.create(UniversityInput::default()).await.unwrap_err();
        match err {
            ServiceError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }

        let created = service
            .create(UniversityInput {
                description: Some("<b>Top</b>".into()),
                website: Some("https://example.ac.jp".into()),
                ..uni("Kyoto", "Japan", 30)
            })
            .await
            .unwrap();
        assert_eq!(created.description.as_deref(), Some("&lt;b&gt;Top&lt;&#x2F;b&gt;"));
        assert_eq!(created.website.as_deref(), Some("https://example.ac.jp"));
    }

    #[tokio::test]
    async fn test_detail_programs_and_cascade() {
        let service = setup().await;
        let university = service.create(uni("ETH", "Switzerland", 7)).await.unwrap();
        let program = service
            .create_program(ProgramInput {
                university_id: Some(university.id.clone()),
                name: Some("MSc Robotics".into()),
                degree_level: Some("Master".into()),
                tuition_fee: Some(1500.0),
                requirements: Some("Bachelor in engineering".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(program.degree_level, "master");

        let detail = service.detail(&university.id).await.unwrap();
        assert_eq!(detail.programs.len(), 1);

        let requirements = service.requirements(&program.id).await.unwrap();
        assert_eq!(requirements.requirements.as_deref(), Some("Bachelor in engineering"));
        assert!(!requirements.general_documents.is_empty());

        let view = service.get_program(&program.id).await.unwrap();
        assert_eq!(view.university_name, "ETH");

        let updated = service
            .update_program(
                &program.id,
                ProgramInput {
                    tuition_fee: Some(2000.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.tuition_fee, Some(2000.0));
        assert_eq!(updated.name, "MSc Robotics");

        service.delete(&university.id).await.unwrap();
        assert_eq!(
            service.get_program(&program.id).await.unwrap_err().code(),
            "PROGRAM_NOT_FOUND"
        );
        assert_eq!(
            service.delete(&university.id).await.unwrap_err().code(),
            "UNIVERSITY_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn test_program_requires_existing_university() {
        let service = setup().await;
        let err = service
            .create_program(ProgramInput {
                university_id: Some(uuid::Uuid::new_v4().to_string()),
                name: Some("BSc".into()),
                degree_level: Some("bachelor".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNIVERSITY_NOT_FOUND");
    }
}
