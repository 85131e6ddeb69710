//! Application repository
//!
//! Student applications to universities and their uploaded documents.

use crate::bind_args;
use crate::db::repositories::Conditions;
use crate::db::DynDatabasePool;
use crate::models::{Application, ApplicationStatus, ApplicationView, Document, Paged};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const VIEW_SELECT: &str = "SELECT a.*, u.name AS university_name, u.country AS university_country, \
     p.name AS program_name \
     FROM applications a \
     JOIN universities u ON u.id = a.university_id \
     LEFT JOIN programs p ON p.id = a.program_id";

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn create(&self, application: &Application) -> Result<Application>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Application>>;

    /// Application with names, only if owned by `user_id`
    async fn get_view_for_user(&self, id: &str, user_id: &str) -> Result<Option<ApplicationView>>;

    /// User's applications, newest first
    async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<ApplicationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<ApplicationView>>;

    /// Every application the user has ever submitted
    async fn count_for_user(&self, user_id: &str) -> Result<i64>;

    /// (status, count) pairs for the user
    async fn count_by_status(&self, user_id: &str) -> Result<Vec<(String, i64)>>;

    /// Whether the user already applied for this university/program pair
    async fn exists(
        &self,
        user_id: &str,
        university_id: &str,
        program_id: Option<&str>,
    ) -> Result<bool>;

    async fn update_status(&self, id: &str, status: ApplicationStatus) -> Result<bool>;

    async fn create_document(&self, document: &Document) -> Result<Document>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>>;

    async fn list_documents_for_application(&self, application_id: &str) -> Result<Vec<Document>>;

    async fn delete_document(&self, id: &str) -> Result<bool>;
}

pub struct SqlxApplicationRepository {
    pool: DynDatabasePool,
}

impl SqlxApplicationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ApplicationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ApplicationRepository for SqlxApplicationRepository {
    async fn create(&self, application: &Application) -> Result<Application> {
        let a = application;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO applications (id, user_id, university_id, program_id, status,
                    personal_statement, notes, submitted_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&a.id)
            .bind(&a.user_id)
            .bind(&a.university_id)
            .bind(&a.program_id)
            .bind(a.status.as_str())
            .bind(&a.personal_statement)
            .bind(&a.notes)
            .bind(a.submitted_at)
            .bind(a.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create application")
        })?;
        Ok(application.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Application>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get application")
        })
    }

    async fn get_view_for_user(&self, id: &str, user_id: &str) -> Result<Option<ApplicationView>> {
        let sql = format!("{} WHERE a.id = ? AND a.user_id = ?", VIEW_SELECT);
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, ApplicationView>(&sql)
                .bind(id)
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get application")
        })
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<ApplicationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<ApplicationView>> {
        let mut conditions = Conditions::new();
        conditions.push("a.user_id = ?", user_id);
        if let Some(status) = status {
            conditions.push("a.status = ?", status.as_str());
        }
        let where_sql = conditions.to_sql();
        let list_sql = format!(
            "{}{} ORDER BY a.submitted_at DESC LIMIT ? OFFSET ?",
            VIEW_SELECT, where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM applications a{}", where_sql);

        with_pool!(self.pool, |pool| {
            let items = bind_args!(
                sqlx::query_as::<_, ApplicationView>(&list_sql),
                conditions.args()
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .context("Failed to list applications")?;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), conditions.args())
                .fetch_one(pool)
                .await
                .context("Failed to count applications")?;
            Ok(Paged { items, total })
        })
    }

    async fn count_for_user(&self, user_id: &str) -> Result<i64> {
        with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM applications WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count applications")
        })
    }

    async fn count_by_status(&self, user_id: &str) -> Result<Vec<(String, i64)>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, (String, i64)>(
                "SELECT status, COUNT(*) FROM applications WHERE user_id = ? GROUP BY status",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
            .context("Failed to count applications by status")
        })
    }

    async fn exists(
        &self,
        user_id: &str,
        university_id: &str,
        program_id: Option<&str>,
    ) -> Result<bool> {
        let count = with_pool!(self.pool, |pool| {
            let result = match program_id {
                Some(program_id) => sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM applications WHERE user_id = ? AND university_id = ? AND program_id = ?",
                )
                .bind(user_id)
                .bind(university_id)
                .bind(program_id)
                .fetch_one(pool)
                .await,
                None => sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM applications WHERE user_id = ? AND university_id = ? AND program_id IS NULL",
                )
                .bind(user_id)
                .bind(university_id)
                .fetch_one(pool)
                .await,
            };
            result.context("Failed to check existing application")
        })?;
        Ok(count > 0)
    }

    async fn update_status(&self, id: &str, status: ApplicationStatus) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("UPDATE applications SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to update application status")
        })?;
        Ok(affected > 0)
    }

    async fn create_document(&self, document: &Document) -> Result<Document> {
        let d = document;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO documents (id, user_id, application_id, document_type, file_name,
                    file_path, file_size, mime_type, uploaded_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&d.id)
            .bind(&d.user_id)
            .bind(&d.application_id)
            .bind(&d.document_type)
            .bind(&d.file_name)
            .bind(&d.file_path)
            .bind(d.file_size)
            .bind(&d.mime_type)
            .bind(d.uploaded_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create document")
        })?;
        Ok(document.clone())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get document")
        })
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Document>(
                "SELECT * FROM documents WHERE user_id = ? ORDER BY uploaded_at DESC",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
            .context("Failed to list documents")
        })
    }

    async fn list_documents_for_application(&self, application_id: &str) -> Result<Vec<Document>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Document>(
                "SELECT * FROM documents WHERE application_id = ? ORDER BY uploaded_at DESC",
            )
            .bind(application_id)
            .fetch_all(pool)
            .await
            .context("Failed to list application documents")
        })
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to delete document")
        })?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxUniversityRepository, SqlxUserRepository, UniversityRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Program, University, User};

    struct Fixture {
        repo: SqlxApplicationRepository,
        user: User,
        university: University,
        program: Program,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user = User::new("s@example.com".into(), "h".into(), "Student".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();

        let universities = SqlxUniversityRepository::new(pool.clone());
        let university = University::new("ETH Zurich".into(), "Switzerland".into());
        universities.create(&university).await.unwrap();
        let program = Program::new(university.id.clone(), "Physics".into(), "master".into());
        universities.create_program(&program).await.unwrap();

        Fixture {
            repo: SqlxApplicationRepository::new(pool),
            user,
            university,
            program,
        }
    }

    #[tokio::test]
    async fn test_create_and_view() {
        let f = setup().await;
        let app = Application::new(
            f.user.id.clone(),
            f.university.id.clone(),
            Some(f.program.id.clone()),
        );
        f.repo.create(&app).await.unwrap();

        let view = f
            .repo
            .get_view_for_user(&app.id, &f.user.id)
            .await
            .unwrap()
            .expect("view should exist");
        assert_eq!(view.university_name, "ETH Zurich");
        assert_eq!(view.program_name.as_deref(), Some("Physics"));

        assert!(f.repo.get_view_for_user(&app.id, "someone-else").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exists_and_counts() {
        let f = setup().await;
        let with_program = Application::new(
            f.user.id.clone(),
            f.university.id.clone(),
            Some(f.program.id.clone()),
        );
        let without_program = Application::new(f.user.id.clone(), f.university.id.clone(), None);
        f.repo.create(&with_program).await.unwrap();

        assert!(f.repo.exists(&f.user.id, &f.university.id, Some(&f.program.id)).await.unwrap());
        assert!(!f.repo.exists(&f.user.id, &f.university.id, None).await.unwrap());

        f.repo.create(&without_program).await.unwrap();
        f.repo
            .update_status(&without_program.id, ApplicationStatus::Withdrawn)
            .await
            .unwrap();

        assert_eq!(f.repo.count_for_user(&f.user.id).await.unwrap(), 2);
        let mut by_status = f.repo.count_by_status(&f.user.id).await.unwrap();
        by_status.sort();
        assert_eq!(
            by_status,
            vec![("pending".to_string(), 1), ("withdrawn".to_string(), 1)]
        );

        let page = f
            .repo
            .list_for_user(&f.user.id, Some(ApplicationStatus::Pending), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].application.id, with_program.id);
    }

    #[tokio::test]
    async fn test_documents() {
        let f = setup().await;
        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: f.user.id.clone(),
            application_id: None,
            document_type: "transcript".into(),
            file_name: "grades.pdf".into(),
            file_path: "uploads/x.pdf".into(),
            file_size: 1024,
            mime_type: "application/pdf".into(),
            uploaded_at: Utc::now(),
        };
        f.repo.create_document(&doc).await.unwrap();

        assert_eq!(f.repo.list_documents(&f.user.id).await.unwrap().len(), 1);
        assert!(f.repo.delete_document(&doc.id).await.unwrap());
        assert!(f.repo.get_document(&doc.id).await.unwrap().is_none());
    }
}
