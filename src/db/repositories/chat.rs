//! Chat conversation repository

use crate::db::DynDatabasePool;
use crate::models::{ChatMessage, Conversation, ConversationSummary};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<Conversation>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// User's conversations, most recently active first
    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationSummary>>;

    async fn count_conversations(&self, user_id: &str) -> Result<i64>;

    async fn add_message(&self, message: &ChatMessage) -> Result<ChatMessage>;

    /// Messages in posting order
    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;

    async fn touch(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn delete_conversation(&self, id: &str) -> Result<bool>;
}

pub struct SqlxChatRepository {
    pool: DynDatabasePool,
}

impl SqlxChatRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ChatRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ChatRepository for SqlxChatRepository {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<Conversation> {
        let c = conversation;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "INSERT INTO chat_conversations (id, user_id, title, created_at, last_message_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&c.id)
            .bind(&c.user_id)
            .bind(&c.title)
            .bind(c.created_at)
            .bind(c.last_message_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create conversation")
        })?;
        Ok(conversation.clone())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Conversation>("SELECT * FROM chat_conversations WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get conversation")
        })
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationSummary>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, ConversationSummary>(
                r#"
                SELECT c.*,
                    (SELECT COUNT(*) FROM chat_messages m WHERE m.conversation_id = c.id) AS message_count
                FROM chat_conversations c
                WHERE c.user_id = ?
                ORDER BY c.last_message_at DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .context("Failed to list conversations")
        })
    }

    async fn count_conversations(&self, user_id: &str) -> Result<i64> {
        with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_conversations WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count conversations")
        })
    }

    async fn add_message(&self, message: &ChatMessage) -> Result<ChatMessage> {
        let m = message;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "INSERT INTO chat_messages (id, conversation_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&m.id)
            .bind(&m.conversation_id)
            .bind(m.role.as_str())
            .bind(&m.content)
            .bind(m.created_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to add chat message")
        })?;
        Ok(message.clone())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, ChatMessage>(
                "SELECT * FROM chat_messages WHERE conversation_id = ? ORDER BY created_at ASC",
            )
            .bind(conversation_id)
            .fetch_all(pool)
            .await
            .context("Failed to list chat messages")
        })
    }

    async fn touch(&self, conversation_id: &str, at: DateTime<Utc>) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query("UPDATE chat_conversations SET last_message_at = ? WHERE id = ?")
                .bind(at)
                .bind(conversation_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to update conversation")
        })?;
        Ok(())
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM chat_conversations WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to delete conversation")
        })?;
        Ok(affected > 0)
    }
}
