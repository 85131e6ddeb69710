//! Scholarship repository

use crate::bind_args;
use crate::db::repositories::Conditions;
use crate::db::DynDatabasePool;
use crate::models::{Paged, Scholarship, ScholarshipApplication};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ScholarshipFilter {
    pub country: Option<String>,
    pub degree_level: Option<String>,
}

/// Active and not past deadline on `today`
fn open_conditions(today: NaiveDate) -> Conditions {
    let mut conditions = Conditions::new();
    conditions.raw("is_active = TRUE");
    conditions.push("(deadline IS NULL OR deadline >= ?)", today);
    conditions
}

#[async_trait]
pub trait ScholarshipRepository: Send + Sync {
    async fn create(&self, scholarship: &Scholarship) -> Result<Scholarship>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Scholarship>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    /// Open scholarships ordered by deadline, open-ended last
    async fn list_open(
        &self,
        filter: &ScholarshipFilter,
        today: NaiveDate,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<Scholarship>>;

    /// Open scholarships in `country` or "Global", with a null or matching degree level
    async fn match_candidates(
        &self,
        country: &str,
        academic_level: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<Scholarship>>;

    async fn create_application(&self, application: &ScholarshipApplication) -> Result<()>;

    async fn has_applied(&self, user_id: &str, scholarship_id: &str) -> Result<bool>;
}

pub struct SqlxScholarshipRepository {
    pool: DynDatabasePool,
}

impl SqlxScholarshipRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ScholarshipRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ScholarshipRepository for SqlxScholarshipRepository {
    async fn create(&self, scholarship: &Scholarship) -> Result<Scholarship> {
        let s = scholarship;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO scholarships (id, name, provider, country, degree_level, amount,
                    currency, deadline, description, eligibility, url, is_active, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&s.id)
            .bind(&s.name)
            .bind(&s.provider)
            .bind(&s.country)
            .bind(&s.degree_level)
            .bind(s.amount)
            .bind(&s.currency)
            .bind(s.deadline)
            .bind(&s.description)
            .bind(&s.eligibility)
            .bind(&s.url)
            .bind(s.is_active)
            .bind(s.created_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create scholarship")
        })?;
        Ok(scholarship.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Scholarship>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Scholarship>("SELECT * FROM scholarships WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get scholarship")
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM scholarships WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to delete scholarship")
        })?;
        Ok(affected > 0)
    }

    async fn list_open(
        &self,
        filter: &ScholarshipFilter,
        today: NaiveDate,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<Scholarship>> {
        let mut conditions = open_conditions(today);
        if let Some(country) = &filter.country {
            conditions.push("country = ?", country.as_str());
        }
        if let Some(level) = &filter.degree_level {
            conditions.push("degree_level = ?", level.as_str());
        }
        let where_sql = conditions.to_sql();
        let list_sql = format!(
            "SELECT * FROM scholarships{} ORDER BY deadline IS NULL, deadline ASC, name ASC LIMIT ? OFFSET ?",
            where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM scholarships{}", where_sql);

        with_pool!(self.pool, |pool| {
            let items = bind_args!(
                sqlx::query_as::<_, Scholarship>(&list_sql),
                conditions.args()
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .context("Failed to list scholarships")?;
            let total = bind_args!(
                sqlx::query_scalar::<_, i64>(&count_sql),
                conditions.args()
            )
            .fetch_one(pool)
            .await
            .context("Failed to count scholarships")?;
            Ok(Paged { items, total })
        })
    }

    async fn match_candidates(
        &self,
        country: &str,
        academic_level: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<Scholarship>> {
        let mut conditions = open_conditions(today);
        conditions.push("(country = ? OR country = 'Global')", country);
        match academic_level {
            Some(level) => {
                conditions.push("(degree_level IS NULL OR degree_level = ?)", level);
            }
            None => {
                conditions.raw("degree_level IS NULL");
            }
        }
        let sql = format!(
            "SELECT * FROM scholarships{} ORDER BY deadline IS NULL, deadline ASC",
            conditions.to_sql()
        );

        with_pool!(self.pool, |pool| {
            bind_args!(
                sqlx::query_as::<_, Scholarship>(&sql),
                conditions.args()
            )
            .fetch_all(pool)
            .await
            .context("Failed to load scholarship candidates")
        })
    }

    async fn create_application(&self, application: &ScholarshipApplication) -> Result<()> {
        let a = application;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "INSERT INTO scholarship_applications (id, user_id, scholarship_id, status, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&a.id)
            .bind(&a.user_id)
            .bind(&a.scholarship_id)
            .bind(&a.status)
            .bind(a.created_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create scholarship application")
        })?;
        Ok(())
    }

    async fn has_applied(&self, user_id: &str, scholarship_id: &str) -> Result<bool> {
        let count = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM scholarship_applications WHERE user_id = ? AND scholarship_id = ?",
            )
            .bind(user_id)
            .bind(scholarship_id)
            .fetch_one(pool)
            .await
            .context("Failed to check scholarship application")
        })?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    async fn setup() -> (crate::db::DynDatabasePool, SqlxScholarshipRepository) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        (pool.clone(), SqlxScholarshipRepository::new(pool))
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scholarship(name: &str, country: &str, deadline: Option<NaiveDate>) -> Scholarship {
        let mut s = Scholarship::new(name.into(), country.into());
        s.deadline = deadline;
        s
    }

    #[tokio::test]
    async fn test_list_open_excludes_expired_and_inactive() {
        let (_pool, repo) = setup().await;
        let today = day(2025, 6, 1);
        repo.create(&scholarship("Late", "Japan", Some(day(2025, 9, 1)))).await.unwrap();
        repo.create(&scholarship("Soon", "Japan", Some(day(2025, 6, 1)))).await.unwrap();
        repo.create(&scholarship("Open", "UK", None)).await.unwrap();
        repo.create(&scholarship("Past", "Japan", Some(day(2025, 5, 31)))).await.unwrap();
        let mut inactive = scholarship("Off", "Japan", None);
        inactive.is_active = false;
        repo.create(&inactive).await.unwrap();

        let page = repo
            .list_open(&ScholarshipFilter::default(), today, 10, 0)
            .await
            .unwrap();
        let names: Vec<_> = page.items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Soon", "Late", "Open"]);
        assert_eq!(page.total, 3);

        let filter = ScholarshipFilter {
            country: Some("Japan".into()),
            ..Default::default()
        };
        assert_eq!(repo.list_open(&filter, today, 10, 0).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_match_candidates() {
        let (_pool, repo) = setup().await;
        let today = day(2025, 1, 1);
        let mut master = scholarship("DAAD", "Germany", None);
        master.degree_level = Some("master".into());
        repo.create(&master).await.unwrap();
        let mut phd = scholarship("PhD grant", "Germany", None);
        phd.degree_level = Some("phd".into());
        repo.create(&phd).await.unwrap();
        repo.create(&scholarship("Anywhere", "Global", None)).await.unwrap();
        repo.create(&scholarship("Elsewhere", "Japan", None)).await.unwrap();

        let found = repo
            .match_candidates("Germany", Some("master"), today)
            .await
            .unwrap();
        let mut names: Vec<_> = found.iter().map(|s| s.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["Anywhere", "DAAD"]);
    }

    #[tokio::test]
    async fn test_apply_once() {
        let (pool, repo) = setup().await;
        let user = User::new("s@example.com".into(), "h".into(), "S".into());
        SqlxUserRepository::new(pool).create(&user).await.unwrap();
        let s = scholarship("Fulbright", "USA", None);
        repo.create(&s).await.unwrap();

        repo.create_application(&ScholarshipApplication::new(user.id.clone(), s.id.clone()))
            .await
            .unwrap();
        assert!(repo.has_applied(&user.id, &s.id).await.unwrap());
        assert!(repo
            .create_application(&ScholarshipApplication::new(user.id.clone(), s.id.clone()))
            .await
            .is_err());
    }
}
