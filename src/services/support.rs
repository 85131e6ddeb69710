//! Support tickets

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::{sanitize_text, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::SupportRepository;
use crate::models::{
    SupportTicket, TicketCategory, TicketMessage, TicketMessageView, TicketPriority,
    TicketStatus, TicketSummary, User,
};

const MAX_MESSAGE_LEN: usize = 5000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketInput {
    pub subject: Option<String>,
    pub message: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetail {
    pub ticket: SupportTicket,
    pub messages: Vec<TicketMessageView>,
}

fn validate_message(v: &mut Validator, message: Option<&str>) {
    v.required("message", message);
    if let Some(message) = message {
        v.max_len("message", message, MAX_MESSAGE_LEN);
    }
}

fn parse_status(status: Option<&str>) -> ServiceResult<Option<TicketStatus>> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let mut v = Validator::new();
            v.one_of("status", raw, &TicketStatus::names());
            v.finish()?;
            Ok(raw.parse().ok())
        }
        None => Ok(None),
    }
}

pub struct SupportService {
    repo: Arc<dyn SupportRepository>,
}

impl SupportService {
    pub fn new(repo: Arc<dyn SupportRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, user: &User, input: CreateTicketInput) -> ServiceResult<TicketDetail> {
        let category = input.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let priority = input.priority.as_deref().map(str::trim).filter(|p| !p.is_empty());

        let mut v = Validator::new();
        v.required("subject", input.subject.as_deref());
        if let Some(subject) = input.subject.as_deref() {
            v.max_len("subject", subject, 200);
        }
        validate_message(&mut v, input.message.as_deref());
        if let Some(category) = category {
            v.one_of("category", category, &TicketCategory::names());
        }
        if let Some(priority) = priority {
            v.one_of("priority", priority, &TicketPriority::names());
        }
        v.finish()?;

        let category = category
            .and_then(|c| c.parse().ok())
            .unwrap_or(TicketCategory::General);
        let mut priority = priority
            .and_then(|p| p.parse().ok())
            .unwrap_or(TicketPriority::Medium);
        if user.effective_tier(Utc::now()).features().premium_support {
            priority = priority.at_least(TicketPriority::High);
        }

        let ticket = SupportTicket::new(
            user.id.clone(),
            sanitize_text(input.subject.as_deref().unwrap_or_default()),
            category,
            priority,
        );
        let ticket = self.repo.create_ticket(&ticket).await?;
        self.repo
            .add_message(&TicketMessage::new(
                ticket.id.clone(),
                user.id.clone(),
                sanitize_text(input.message.as_deref().unwrap_or_default()),
                false,
            ))
            .await?;

        tracing::info!(
            "Support ticket {} opened by {} ({} priority)",
            ticket.id,
            user.id,
            ticket.priority
        );
        let messages = self.repo.messages(&ticket.id).await?;
        Ok(TicketDetail { ticket, messages })
    }

    pub async fn list(&self, user_id: &str, status: Option<&str>) -> ServiceResult<Vec<TicketSummary>> {
        let status = parse_status(status)?;
        Ok(self.repo.list_tickets(Some(user_id), status).await?)
    }

    /// Every user's tickets
    pub async fn list_all(&self, status: Option<&str>) -> ServiceResult<Vec<TicketSummary>> {
        let status = parse_status(status)?;
        Ok(self.repo.list_tickets(None, status).await?)
    }

    /// Ticket visible to `user` (admins see every ticket)
    async fn get_visible(&self, user: &User, id: &str) -> ServiceResult<SupportTicket> {
        self.repo
            .get_ticket(id)
            .await?
            .filter(|t| t.user_id == user.id || user.is_admin())
            .ok_or_else(|| ServiceError::not_found("TICKET_NOT_FOUND", "Ticket not found"))
    }

    pub async fn detail(&self, user: &User, id: &str) -> ServiceResult<TicketDetail> {
        let ticket = self.get_visible(user, id).await?;
        let messages = self.repo.messages(id).await?;
        Ok(TicketDetail { ticket, messages })
    }

    async fn post(
        &self,
        author: &User,
        ticket: &SupportTicket,
        message: Option<&str>,
        is_staff: bool,
    ) -> ServiceResult<TicketMessage> {
        let mut v = Validator::new();
        validate_message(&mut v, message);
        v.finish()?;

        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::bad_request(
                "TICKET_CLOSED",
                "Cannot reply to a closed ticket",
            ));
        }

        let message = TicketMessage::new(
            ticket.id.clone(),
            author.id.clone(),
            sanitize_text(message.unwrap_or_default()),
            is_staff,
        );
        Ok(self.repo.add_message(&message).await?)
    }

    /// Owner reply; an answered ticket goes back to waiting on staff
    pub async fn reply(&self, user: &User, id: &str, message: Option<&str>) -> ServiceResult<TicketMessage> {
        let ticket = self
            .repo
            .get_ticket(id)
            .await?
            .filter(|t| t.user_id == user.id)
            .ok_or_else(|| ServiceError::not_found("TICKET_NOT_FOUND", "Ticket not found"))?;
        let posted = self.post(user, &ticket, message, false).await?;
        if ticket.status == TicketStatus::Answered {
            self.repo.set_status(id, TicketStatus::Waiting, None).await?;
        }
        Ok(posted)
    }

    pub async fn staff_reply(
        &self,
        admin: &User,
        id: &str,
        message: Option<&str>,
    ) -> ServiceResult<TicketMessage> {
        let ticket = self.get_visible(admin, id).await?;
        let posted = self.post(admin, &ticket, message, true).await?;
        self.repo.set_status(id, TicketStatus::Answered, None).await?;
        Ok(posted)
    }

    pub async fn close(&self, user: &User, id: &str) -> ServiceResult<SupportTicket> {
        let mut ticket = self.get_visible(user, id).await?;
        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::bad_request(
                "ALREADY_CLOSED",
                "Ticket is already closed",
            ));
        }
        let now = Utc::now();
        self.repo
            .set_status(id, TicketStatus::Closed, Some(now))
            .await?;
        ticket.status = TicketStatus::Closed;
        ticket.closed_at = Some(now);
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSupportRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{SubscriptionTier, UserRole};
    use chrono::Duration;

    struct Fixture {
        service: SupportService,
        student: User,
        admin: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let student = User::new("s@example.com".into(), "h".into(), "Student".into());
        let mut admin = User::new("a@example.com".into(), "h".into(), "Staff".into());
        admin.role = UserRole::Admin;
        users.create(&student).await.unwrap();
        users.create(&admin).await.unwrap();
        Fixture {
            service: SupportService::new(SqlxSupportRepository::boxed(pool)),
            student,
            admin,
        }
    }

    fn ticket(priority: Option<&str>) -> CreateTicketInput {
        CreateTicketInput {
            subject: Some("Payment stuck".into()),
            message: Some("My card was charged twice".into()),
            category: Some("payment".into()),
            priority: priority.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_create_defaults_and_premium_priority() {
        let f = setup().await;
        let created = f
            .service
            .create(&f.student, CreateTicketInput {
                category: None,
                ..ticket(None)
            })
            .await
            .unwrap();
        assert_eq!(created.ticket.category, TicketCategory::General);
        assert_eq!(created.ticket.priority, TicketPriority::Medium);
        assert_eq!(created.messages.len(), 1);
        assert_eq!(created.messages[0].author_name.as_deref(), Some("Student"));

        let mut global = f.student.clone();
        global.subscription_type = SubscriptionTier::Global;
        global.subscription_expires_at = Some(Utc::now() + Duration::days(30));
        let premium = f.service.create(&global, ticket(Some("low"))).await.unwrap();
        assert_eq!(premium.ticket.priority, TicketPriority::High);
        let urgent = f.service.create(&global, ticket(Some("urgent"))).await.unwrap();
        assert_eq!(urgent.ticket.priority, TicketPriority::Urgent);

        let err = f.service.create(&f.student, ticket(Some("asap"))).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_conversation_flow() {
        let f = setup().await;
        let created = f.service.create(&f.student, ticket(None)).await.unwrap();
        let id = created.ticket.id.clone();

        f.service
            .staff_reply(&f.admin, &id, Some("We are looking into it"))
            .await
            .unwrap();
        let detail = f.service.detail(&f.student, &id).await.unwrap();
        assert_eq!(detail.ticket.status, TicketStatus::Answered);
        assert!(detail.messages[1].message.is_staff);

        f.service.reply(&f.student, &id, Some("Thanks")).await.unwrap();
        let detail = f.service.detail(&f.student, &id).await.unwrap();
        assert_eq!(detail.ticket.status, TicketStatus::Waiting);
        assert_eq!(detail.messages.len(), 3);

        let listed = f.service.list(&f.student.id, None).await.unwrap();
        assert_eq!(listed[0].message_count, 3);

        let closed = f.service.close(&f.student, &id).await.unwrap();
        assert!(closed.closed_at.is_some());
        let err = f.service.close(&f.student, &id).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_CLOSED");
        let err = f.service.reply(&f.student, &id, Some("Hello?")).await.unwrap_err();
        assert_eq!(err.code(), "TICKET_CLOSED");

        assert_eq!(f.service.list_all(Some("closed")).await.unwrap().len(), 1);
        assert!(f.service.list(&f.student.id, Some("open")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_cannot_see_ticket() {
        let f = setup().await;
        let created = f.service.create(&f.student, ticket(None)).await.unwrap();
        let stranger = User::new("x@example.com".into(), "h".into(), "X".into());
        let err = f.service.detail(&stranger, &created.ticket.id).await.unwrap_err();
        assert_eq!(err.code(), "TICKET_NOT_FOUND");
        f.service.detail(&f.admin, &created.ticket.id).await.unwrap();
    }
}
