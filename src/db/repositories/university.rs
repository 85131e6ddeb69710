//! University and program repository
//!
//! Universities and their programs share one repository since programs are
//! always read through their university (listing joins, cascade deletes).

use crate::bind_args;
use crate::db::repositories::Conditions;
use crate::db::DynDatabasePool;
use crate::models::{Paged, Program, ProgramWithUniversity, University};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Filters for the university listing
#[derive(Debug, Clone, Default)]
pub struct UniversityFilter {
    pub country: Option<String>,
    pub max_ranking: Option<i64>,
    pub has_scholarship: Option<bool>,
    pub search: Option<String>,
}

impl UniversityFilter {
    fn conditions(&self) -> Conditions {
        let mut conditions = Conditions::new();
        if let Some(country) = &self.country {
            conditions.push("country = ?", country.as_str());
        }
        if let Some(max) = self.max_ranking {
            conditions.push("ranking <= ?", max);
        }
        if let Some(has) = self.has_scholarship {
            conditions.push("has_scholarship = ?", has);
        }
        if let Some(term) = &self.search {
            conditions.search(&["name"], term);
        }
        conditions
    }
}

/// Filters for the program listing
#[derive(Debug, Clone, Default)]
pub struct ProgramFilter {
    pub degree_level: Option<String>,
    pub university_id: Option<String>,
    pub field: Option<String>,
    pub country: Option<String>,
    pub min_fee: Option<f64>,
    pub max_fee: Option<f64>,
    pub search: Option<String>,
}

impl ProgramFilter {
    fn conditions(&self) -> Conditions {
        let mut conditions = Conditions::new();
        if let Some(level) = &self.degree_level {
            conditions.push("p.degree_level = ?", level.as_str());
        }
        if let Some(id) = &self.university_id {
            conditions.push("p.university_id = ?", id.as_str());
        }
        if let Some(field) = &self.field {
            conditions.push("p.field = ?", field.as_str());
        }
        if let Some(country) = &self.country {
            conditions.push("u.country = ?", country.as_str());
        }
        if let Some(min) = self.min_fee {
            conditions.push("p.tuition_fee >= ?", min);
        }
        if let Some(max) = self.max_fee {
            conditions.push("p.tuition_fee <= ?", max);
        }
        if let Some(term) = &self.search {
            conditions.search(&["p.name", "p.field"], term);
        }
        conditions
    }
}

/// Number of universities per country
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

const PROGRAM_VIEW_SELECT: &str = "SELECT p.*, u.name AS university_name, u.country AS university_country \
     FROM programs p JOIN universities u ON u.id = p.university_id";

#[async_trait]
pub trait UniversityRepository: Send + Sync {
    async fn create(&self, university: &University) -> Result<University>;

    async fn get_by_id(&self, id: &str) -> Result<Option<University>>;

    async fn update(&self, university: &University) -> Result<University>;

    /// Delete a university and (by cascade) its programs. Returns false if absent.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Page of universities ordered by ranking, unranked last
    async fn list(&self, filter: &UniversityFilter, limit: i64, offset: i64)
        -> Result<Paged<University>>;

    async fn countries(&self) -> Result<Vec<CountryCount>>;

    async fn create_program(&self, program: &Program) -> Result<Program>;

    async fn get_program(&self, id: &str) -> Result<Option<Program>>;

    async fn get_program_view(&self, id: &str) -> Result<Option<ProgramWithUniversity>>;

    async fn update_program(&self, program: &Program) -> Result<Program>;

    async fn delete_program(&self, id: &str) -> Result<bool>;

    /// Page of programs ordered by tuition ascending
    async fn list_programs(
        &self,
        filter: &ProgramFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<ProgramWithUniversity>>;

    async fn programs_for_university(&self, university_id: &str) -> Result<Vec<Program>>;
}

pub struct SqlxUniversityRepository {
    pool: DynDatabasePool,
}

impl SqlxUniversityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UniversityRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UniversityRepository for SqlxUniversityRepository {
    async fn create(&self, university: &University) -> Result<University> {
        let u = university;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO universities (id, name, country, city, region, ranking, description,
                    website, logo_url, tuition_min, tuition_max, acceptance_rate, has_scholarship,
                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&u.id)
            .bind(&u.name)
            .bind(&u.country)
            .bind(&u.city)
            .bind(&u.region)
            .bind(u.ranking)
            .bind(&u.description)
            .bind(&u.website)
            .bind(&u.logo_url)
            .bind(u.tuition_min)
            .bind(u.tuition_max)
            .bind(u.acceptance_rate)
            .bind(u.has_scholarship)
            .bind(u.created_at)
            .bind(u.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create university")
        })?;
        Ok(university.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<University>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, University>("SELECT * FROM universities WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get university")
        })
    }

    async fn update(&self, university: &University) -> Result<University> {
        let u = university;
        let now = chrono::Utc::now();
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE universities SET name = ?, country = ?, city = ?, region = ?, ranking = ?,
                    description = ?, website = ?, logo_url = ?, tuition_min = ?, tuition_max = ?,
                    acceptance_rate = ?, has_scholarship = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&u.name)
            .bind(&u.country)
            .bind(&u.city)
            .bind(&u.region)
            .bind(u.ranking)
            .bind(&u.description)
            .bind(&u.website)
            .bind(&u.logo_url)
            .bind(u.tuition_min)
            .bind(u.tuition_max)
            .bind(u.acceptance_rate)
            .bind(u.has_scholarship)
            .bind(now)
            .bind(&u.id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to update university")
        })?;

        let mut updated = university.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM universities WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to delete university")
        })?;
        Ok(affected > 0)
    }

    async fn list(
        &self,
        filter: &UniversityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<University>> {
        let conditions = filter.conditions();
        let where_sql = conditions.to_sql();
        let list_sql = format!(
            "SELECT * FROM universities{} ORDER BY ranking IS NULL, ranking ASC, name ASC LIMIT ? OFFSET ?",
            where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM universities{}", where_sql);

        with_pool!(self.pool, |pool| {
            let items = bind_args!(sqlx::query_as::<_, University>(&list_sql), conditions.args())
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
                .context("Failed to list universities")?;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), conditions.args())
                .fetch_one(pool)
                .await
                .context("Failed to count universities")?;
            Ok(Paged { items, total })
        })
    }

    async fn countries(&self) -> Result<Vec<CountryCount>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, CountryCount>(
                "SELECT country, COUNT(*) AS count FROM universities GROUP BY country ORDER BY country",
            )
            .fetch_all(pool)
            .await
            .context("Failed to list countries")
        })
    }

    async fn create_program(&self, program: &Program) -> Result<Program> {
        let p = program;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO programs (id, university_id, name, degree_level, field, duration,
                    tuition_fee, currency, language, intake, requirements, description,
                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&p.id)
            .bind(&p.university_id)
            .bind(&p.name)
            .bind(&p.degree_level)
            .bind(&p.field)
            .bind(&p.duration)
            .bind(p.tuition_fee)
            .bind(&p.currency)
            .bind(&p.language)
            .bind(&p.intake)
            .bind(&p.requirements)
            .bind(&p.description)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create program")
        })?;
        Ok(program.clone())
    }

    async fn get_program(&self, id: &str) -> Result<Option<Program>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Program>("SELECT * FROM programs WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get program")
        })
    }

    async fn get_program_view(&self, id: &str) -> Result<Option<ProgramWithUniversity>> {
        let sql = format!("{} WHERE p.id = ?", PROGRAM_VIEW_SELECT);
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, ProgramWithUniversity>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get program")
        })
    }

    async fn update_program(&self, program: &Program) -> Result<Program> {
        let p = program;
        let now = chrono::Utc::now();
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE programs SET name = ?, degree_level = ?, field = ?, duration = ?,
                    tuition_fee = ?, currency = ?, language = ?, intake = ?, requirements = ?,
                    description = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&p.name)
            .bind(&p.degree_level)
            .bind(&p.field)
            .bind(&p.duration)
            .bind(p.tuition_fee)
            .bind(&p.currency)
            .bind(&p.language)
            .bind(&p.intake)
            .bind(&p.requirements)
            .bind(&p.description)
            .bind(now)
            .bind(&p.id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to update program")
        })?;

        let mut updated = program.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    async fn delete_program(&self, id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM programs WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to delete program")
        })?;
        Ok(affected > 0)
    }

    async fn list_programs(
        &self,
        filter: &ProgramFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<ProgramWithUniversity>> {
        let conditions = filter.conditions();
        let where_sql = conditions.to_sql();
        let list_sql = format!(
            "{}{} ORDER BY p.tuition_fee IS NULL, p.tuition_fee ASC, p.name ASC LIMIT ? OFFSET ?",
            PROGRAM_VIEW_SELECT, where_sql
        );
        let count_sql = format!(
            "SELECT COUNT(*) FROM programs p JOIN universities u ON u.id = p.university_id{}",
            where_sql
        );

        with_pool!(self.pool, |pool| {
            let items = bind_args!(
                sqlx::query_as::<_, ProgramWithUniversity>(&list_sql),
                conditions.args()
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .context("Failed to list programs")?;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), conditions.args())
                .fetch_one(pool)
                .await
                .context("Failed to count programs")?;
            Ok(Paged { items, total })
        })
    }

    async fn programs_for_university(&self, university_id: &str) -> Result<Vec<Program>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Program>(
                "SELECT * FROM programs WHERE university_id = ? ORDER BY degree_level, name",
            )
            .bind(university_id)
            .fetch_all(pool)
            .await
            .context("Failed to list university programs")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUniversityRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUniversityRepository::new(pool)
    }

    fn university(name: &str, country: &str, ranking: Option<i32>) -> University {
        let mut u = University::new(name.to_string(), country.to_string());
        u.ranking = ranking;
        u
    }

    #[tokio::test]
    async fn test_list_orders_by_ranking_with_nulls_last() {
        let repo = setup_test_repo().await;
        repo.create(&university("Unranked", "Japan", None)).await.unwrap();
        repo.create(&university("Second", "Japan", Some(20))).await.unwrap();
        repo.create(&university("First", "UK", Some(3))).await.unwrap();

        let page = repo.list(&UniversityFilter::default(), 10, 0).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second", "Unranked"]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = setup_test_repo().await;
        let mut tokyo = university("University of Tokyo", "Japan", Some(25));
        tokyo.has_scholarship = true;
        repo.create(&tokyo).await.unwrap();
        repo.create(&university("Kyoto University", "Japan", Some(40))).await.unwrap();
        repo.create(&university("Oxford", "UK", Some(2))).await.unwrap();

        let filter = UniversityFilter {
            country: Some("Japan".into()),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter, 10, 0).await.unwrap().total, 2);

        let filter = UniversityFilter {
            max_ranking: Some(30),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter, 10, 0).await.unwrap().total, 2);

        let filter = UniversityFilter {
            has_scholarship: Some(true),
            search: Some("tokyo".into()),
            ..Default::default()
        };
        let page = repo.list(&filter, 10, 0).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, tokyo.id);

        let page = repo.list(&UniversityFilter::default(), 1, 1).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_countries() {
        let repo = setup_test_repo().await;
        repo.create(&university("A", "Japan", None)).await.unwrap();
        repo.create(&university("B", "Japan", None)).await.unwrap();
        repo.create(&university("C", "Germany", None)).await.unwrap();

        let countries = repo.countries().await.unwrap();
        assert_eq!(countries.len(), 2);
        assert_eq!(countries[0].country, "Germany");
        assert_eq!(countries[1].count, 2);
    }

    #[tokio::test]
    async fn test_programs_join_and_cascade() {
        let repo = setup_test_repo().await;
        let uni = university("TU Munich", "Germany", Some(30));
        repo.create(&uni).await.unwrap();

        let mut cheap = Program::new(uni.id.clone(), "Informatics".into(), "master".into());
        cheap.tuition_fee = Some(0.0);
        let mut pricey = Program::new(uni.id.clone(), "MBA".into(), "master".into());
        pricey.tuition_fee = Some(30000.0);
        repo.create_program(&pricey).await.unwrap();
        repo.create_program(&cheap).await.unwrap();

        let page = repo
            .list_programs(&ProgramFilter::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.items[0].program.name, "Informatics");
        assert_eq!(page.items[0].university_name, "TU Munich");

        let filter = ProgramFilter {
            max_fee: Some(1000.0),
            country: Some("Germany".into()),
            ..Default::default()
        };
        assert_eq!(repo.list_programs(&filter, 10, 0).await.unwrap().total, 1);

        let view = repo.get_program_view(&pricey.id).await.unwrap().unwrap();
        assert_eq!(view.university_country, "Germany");

        assert!(repo.delete(&uni.id).await.unwrap());
        assert!(repo.get_program(&cheap.id).await.unwrap().is_none());
        assert!(!repo.delete(&uni.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_program_requires_university() {
        let repo = setup_test_repo().await;
        let orphan = Program::new("missing".into(), "Ghost".into(), "bachelor".into());
        assert!(repo.create_program(&orphan).await.is_err());
    }
}
