//! Support ticket repository

use crate::db::DynDatabasePool;
use crate::models::{SupportTicket, TicketMessage, TicketMessageView, TicketStatus, TicketSummary};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const SUMMARY_SELECT: &str = "SELECT t.*, \
     (SELECT COUNT(*) FROM ticket_messages m WHERE m.ticket_id = t.id) AS message_count \
     FROM support_tickets t";

#[async_trait]
pub trait SupportRepository: Send + Sync {
    async fn create_ticket(&self, ticket: &SupportTicket) -> Result<SupportTicket>;

    async fn get_ticket(&self, id: &str) -> Result<Option<SupportTicket>>;

    /// Tickets with message counts; all users when `user_id` is None
    async fn list_tickets(
        &self,
        user_id: Option<&str>,
        status: Option<TicketStatus>,
    ) -> Result<Vec<TicketSummary>>;

    async fn add_message(&self, message: &TicketMessage) -> Result<TicketMessage>;

    /// Messages in posting order, with author names
    async fn messages(&self, ticket_id: &str) -> Result<Vec<TicketMessageView>>;

    async fn set_status(
        &self,
        id: &str,
        status: TicketStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

pub struct SqlxSupportRepository {
    pool: DynDatabasePool,
}

impl SqlxSupportRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SupportRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SupportRepository for SqlxSupportRepository {
    async fn create_ticket(&self, ticket: &SupportTicket) -> Result<SupportTicket> {
        let t = ticket;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO support_tickets (id, user_id, subject, category, priority, status,
                    created_at, updated_at, closed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&t.id)
            .bind(&t.user_id)
            .bind(&t.subject)
            .bind(t.category.as_str())
            .bind(t.priority.as_str())
            .bind(t.status.as_str())
            .bind(t.created_at)
            .bind(t.updated_at)
            .bind(t.closed_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create ticket")
        })?;
        Ok(ticket.clone())
    }

    async fn get_ticket(&self, id: &str) -> Result<Option<SupportTicket>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, SupportTicket>("SELECT * FROM support_tickets WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get ticket")
        })
    }

    async fn list_tickets(
        &self,
        user_id: Option<&str>,
        status: Option<TicketStatus>,
    ) -> Result<Vec<TicketSummary>> {
        let mut conditions = crate::db::repositories::Conditions::new();
        if let Some(user_id) = user_id {
            conditions.push("t.user_id = ?", user_id);
        }
        if let Some(status) = status {
            conditions.push("t.status = ?", status.as_str());
        }
        let sql = format!(
            "{}{} ORDER BY t.updated_at DESC",
            SUMMARY_SELECT,
            conditions.to_sql()
        );

        with_pool!(self.pool, |pool| {
            crate::bind_args!(sqlx::query_as::<_, TicketSummary>(&sql), conditions.args())
                .fetch_all(pool)
                .await
                .context("Failed to list tickets")
        })
    }

    async fn add_message(&self, message: &TicketMessage) -> Result<TicketMessage> {
        let m = message;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "INSERT INTO ticket_messages (id, ticket_id, user_id, message, is_staff, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&m.id)
            .bind(&m.ticket_id)
            .bind(&m.user_id)
            .bind(&m.message)
            .bind(m.is_staff)
            .bind(m.created_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to add ticket message")
        })?;
        Ok(message.clone())
    }

    async fn messages(&self, ticket_id: &str) -> Result<Vec<TicketMessageView>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, TicketMessageView>(
                r#"
                SELECT m.*, u.full_name AS author_name
                FROM ticket_messages m
                LEFT JOIN users u ON u.id = m.user_id
                WHERE m.ticket_id = ?
                ORDER BY m.created_at ASC
                "#,
            )
            .bind(ticket_id)
            .fetch_all(pool)
            .await
            .context("Failed to list ticket messages")
        })
    }

    async fn set_status(
        &self,
        id: &str,
        status: TicketStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "UPDATE support_tickets SET status = ?, closed_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(status.as_str())
            .bind(closed_at)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to update ticket status")
        })?;
        Ok(())
    }
}
