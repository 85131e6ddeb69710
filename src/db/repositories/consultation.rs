//! Consultation repository

use crate::db::DynDatabasePool;
use crate::models::{Consultation, ConsultationStatus};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait ConsultationRepository: Send + Sync {
    async fn create(&self, consultation: &Consultation) -> Result<Consultation>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Consultation>>;

    /// User's consultations, soonest first
    async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<ConsultationStatus>,
    ) -> Result<Vec<Consultation>>;

    /// Consultations holding a calendar slot that start in `(from, to)`
    async fn list_booked_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Consultation>>;

    async fn reschedule(&self, id: &str, scheduled_at: DateTime<Utc>) -> Result<()>;

    async fn set_status(
        &self,
        id: &str,
        status: ConsultationStatus,
        meeting_link: Option<&str>,
    ) -> Result<()>;
}

pub struct SqlxConsultationRepository {
    pool: DynDatabasePool,
}

impl SqlxConsultationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ConsultationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ConsultationRepository for SqlxConsultationRepository {
    async fn create(&self, consultation: &Consultation) -> Result<Consultation> {
        let c = consultation;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO consultations (id, user_id, consultation_type, scheduled_at,
                    duration_minutes, status, notes, meeting_link, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.id)
            .bind(&c.user_id)
            .bind(c.consultation_type.as_str())
            .bind(c.scheduled_at)
            .bind(c.duration_minutes)
            .bind(c.status.as_str())
            .bind(&c.notes)
            .bind(&c.meeting_link)
            .bind(c.created_at)
            .bind(c.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create consultation")
        })?;
        Ok(consultation.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Consultation>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Consultation>("SELECT * FROM consultations WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get consultation")
        })
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<ConsultationStatus>,
    ) -> Result<Vec<Consultation>> {
        with_pool!(self.pool, |pool| {
            let result = match status {
                Some(status) => sqlx::query_as::<_, Consultation>(
                    "SELECT * FROM consultations WHERE user_id = ? AND status = ? ORDER BY scheduled_at ASC",
                )
                .bind(user_id)
                .bind(status.as_str())
                .fetch_all(pool)
                .await,
                None => sqlx::query_as::<_, Consultation>(
                    "SELECT * FROM consultations WHERE user_id = ? ORDER BY scheduled_at ASC",
                )
                .bind(user_id)
                .fetch_all(pool)
                .await,
            };
            result.context("Failed to list consultations")
        })
    }

    async fn list_booked_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Consultation>> {
        let [a, b, c] = ConsultationStatus::BOOKED;
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Consultation>(
                r#"
                SELECT * FROM consultations
                WHERE status IN (?, ?, ?) AND scheduled_at > ? AND scheduled_at < ?
                ORDER BY scheduled_at ASC
                "#,
            )
            .bind(a.as_str())
            .bind(b.as_str())
            .bind(c.as_str())
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
            .context("Failed to list booked consultations")
        })
    }

    async fn reschedule(&self, id: &str, scheduled_at: DateTime<Utc>) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "UPDATE consultations SET scheduled_at = ?, status = ?, updated_at = ? WHERE id = ?",
            )
            .bind(scheduled_at)
            .bind(ConsultationStatus::Rescheduled.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to reschedule consultation")
        })?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: ConsultationStatus,
        meeting_link: Option<&str>,
    ) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "UPDATE consultations SET status = ?, meeting_link = COALESCE(?, meeting_link), updated_at = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(meeting_link)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to update consultation status")
        })?;
        Ok(())
    }
}
