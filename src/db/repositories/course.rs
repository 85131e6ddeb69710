//! Course repository

use crate::bind_args;
use crate::db::repositories::Conditions;
use crate::db::DynDatabasePool;
use crate::models::{Course, CourseType, Enrollment, EnrollmentView, Paged};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn create(&self, course: &Course) -> Result<Course>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Course>>;

    async fn delete(&self, id: &str) -> Result<bool>;

    /// Active courses, optionally of one type
    async fn list_active(
        &self,
        course_type: Option<CourseType>,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<Course>>;

    async fn enroll(&self, enrollment: &Enrollment) -> Result<Enrollment>;

    async fn is_enrolled(&self, user_id: &str, course_id: &str) -> Result<bool>;

    async fn enrollments_for_user(&self, user_id: &str) -> Result<Vec<EnrollmentView>>;
}

pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, course: &Course) -> Result<Course> {
        let c = course;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO courses (id, title, description, course_type, level, duration, price,
                    currency, instructor, is_active, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.id)
            .bind(&c.title)
            .bind(&c.description)
            .bind(c.course_type.as_str())
            .bind(&c.level)
            .bind(&c.duration)
            .bind(c.price)
            .bind(&c.currency)
            .bind(&c.instructor)
            .bind(c.is_active)
            .bind(c.created_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create course")
        })?;
        Ok(course.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Course>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get course")
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM courses WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to delete course")
        })?;
        Ok(affected > 0)
    }

    async fn list_active(
        &self,
        course_type: Option<CourseType>,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<Course>> {
        let mut conditions = Conditions::new();
        conditions.raw("is_active = TRUE");
        if let Some(course_type) = course_type {
            conditions.push("course_type = ?", course_type.as_str());
        }
        let where_sql = conditions.to_sql();
        let list_sql = format!(
            "SELECT * FROM courses{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM courses{}", where_sql);

        with_pool!(self.pool, |pool| {
            let items = bind_args!(sqlx::query_as::<_, Course>(&list_sql), conditions.args())
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
                .context("Failed to list courses")?;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), conditions.args())
                .fetch_one(pool)
                .await
                .context("Failed to count courses")?;
            Ok(Paged { items, total })
        })
    }

    async fn enroll(&self, enrollment: &Enrollment) -> Result<Enrollment> {
        let e = enrollment;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "INSERT INTO course_enrollments (id, user_id, course_id, progress, status, enrolled_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&e.id)
            .bind(&e.user_id)
            .bind(&e.course_id)
            .bind(e.progress)
            .bind(&e.status)
            .bind(e.enrolled_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create enrollment")
        })?;
        Ok(enrollment.clone())
    }

    async fn is_enrolled(&self, user_id: &str, course_id: &str) -> Result<bool> {
        let count = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM course_enrollments WHERE user_id = ? AND course_id = ?",
            )
            .bind(user_id)
            .bind(course_id)
            .fetch_one(pool)
            .await
            .context("Failed to check enrollment")
        })?;
        Ok(count > 0)
    }

    async fn enrollments_for_user(&self, user_id: &str) -> Result<Vec<EnrollmentView>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, EnrollmentView>(
                r#"
                SELECT e.*, c.title AS course_title, c.course_type AS course_type
                FROM course_enrollments e
                JOIN courses c ON c.id = e.course_id
                WHERE e.user_id = ?
                ORDER BY e.enrolled_at DESC
                "#,
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
            .context("Failed to list enrollments")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    #[tokio::test]
    async fn test_courses_and_enrollment() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user = User::new("c@example.com".into(), "h".into(), "C".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();
        let repo = SqlxCourseRepository::new(pool);

        let ielts = Course::new("IELTS Prep".into(), CourseType::TestPrep);
        let german = Course::new("German A1".into(), CourseType::Language);
        let mut retired = Course::new("Old".into(), CourseType::Skills);
        retired.is_active = false;
        for c in [&ielts, &german, &retired] {
            repo.create(c).await.unwrap();
        }

        assert_eq!(repo.list_active(None, 10, 0).await.unwrap().total, 2);
        let page = repo
            .list_active(Some(CourseType::TestPrep), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "IELTS Prep");

        repo.enroll(&Enrollment::new(user.id.clone(), ielts.id.clone()))
            .await
            .unwrap();
        assert!(repo.is_enrolled(&user.id, &ielts.id).await.unwrap());
        assert!(repo
            .enroll(&Enrollment::new(user.id.clone(), ielts.id.clone()))
            .await
            .is_err());

        let enrollments = repo.enrollments_for_user(&user.id).await.unwrap();
        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].course_title, "IELTS Prep");
        assert_eq!(enrollments[0].course_type, CourseType::TestPrep);
    }
}
