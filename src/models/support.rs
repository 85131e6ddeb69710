use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum TicketCategory {
        General => "general",
        Application => "application",
        Payment => "payment",
        Technical => "technical",
        Subscription => "subscription",
        Other => "other",
    }
}

string_enum! {
    pub enum TicketPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
}

impl TicketPriority {
    fn rank(&self) -> u8 {
        match self {
            TicketPriority::Low => 0,
            TicketPriority::Medium => 1,
            TicketPriority::High => 2,
            TicketPriority::Urgent => 3,
        }
    }

    /// The higher of `self` and `floor`
    pub fn at_least(self, floor: TicketPriority) -> TicketPriority {
        if self.rank() >= floor.rank() {
            self
        } else {
            floor
        }
    }
}

string_enum! {
    pub enum TicketStatus {
        Open => "open",
        Answered => "answered",
        Waiting => "waiting",
        Closed => "closed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    #[sqlx(try_from = "String")]
    pub category: TicketCategory,
    #[sqlx(try_from = "String")]
    pub priority: TicketPriority,
    #[sqlx(try_from = "String")]
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl SupportTicket {
    pub fn new(
        user_id: String,
        subject: String,
        category: TicketCategory,
        priority: TicketPriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            subject,
            category,
            priority,
            status: TicketStatus::Open,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }
}

/// Ticket listing row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub ticket: SupportTicket,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessage {
    pub id: String,
    pub ticket_id: String,
    pub user_id: String,
    pub message: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl TicketMessage {
    pub fn new(ticket_id: String, user_id: String, message: String, is_staff: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_id,
            user_id,
            message,
            is_staff,
            created_at: Utc::now(),
        }
    }
}

/// Ticket message with its author's display name
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessageView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub message: TicketMessage,
    pub author_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_floor() {
        assert_eq!(TicketPriority::Low.at_least(TicketPriority::High), TicketPriority::High);
        assert_eq!(TicketPriority::Urgent.at_least(TicketPriority::High), TicketPriority::Urgent);
        assert_eq!(TicketPriority::High.at_least(TicketPriority::High), TicketPriority::High);
    }
}
