//! Study-abroad chat assistant
//!
//! Replies come from a [`ChatResponder`]; the bundled [`KeywordResponder`]
//! answers common questions from canned text, with depth set by the
//! caller's AI support level.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::validation::{PageMeta, Pagination, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::ChatRepository;
use crate::models::{AiSupport, ChatMessage, ChatRole, Conversation, ConversationSummary, User};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Produces the assistant's answer to one user message
#[async_trait]
pub trait ChatResponder: Send + Sync {
    /// `history` holds the conversation so far, including `message`
    async fn respond(
        &self,
        message: &str,
        history: &[ChatMessage],
        level: AiSupport,
    ) -> anyhow::Result<String>;
}

/// Canned answers picked by keyword
#[derive(Debug, Default, Clone)]
pub struct KeywordResponder;

const REQUIREMENTS_ANSWER: &str = "To study abroad you typically need: 1) a valid passport, 2) academic transcripts, 3) a language proficiency test (IELTS/TOEFL), 4) proof of funds, 5) a statement of purpose.";
const USA_ANSWER: &str = "For studying in the USA you need SAT/GRE scores, a TOEFL score of at least 80, financial documentation covering $50,000-$70,000 per year and strong academic records.";
const SCHOLARSHIP_ANSWER: &str = "We can help you find scholarships! The platform lists many opportunities, and Global plan members get automatic scholarship matching based on their profile.";
const APPLICATION_ANSWER: &str = "The application process: 1) select universities, 2) prepare your documents, 3) write your statement of purpose, 4) submit through the platform, 5) track your status.";

impl KeywordResponder {
    pub fn answer(message: &str, level: AiSupport) -> String {
        if level == AiSupport::Basic {
            return format!(
                "Thank you for your question: \"{}\". Our assistant gives basic answers on the free plan. For full guidance, upgrade to a paid plan.",
                message
            );
        }

        let lower = message.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        let mut answer = if has(&["requirement", "need"]) {
            REQUIREMENTS_ANSWER.to_string()
        } else if has(&["usa", "america"]) {
            USA_ANSWER.to_string()
        } else if has(&["scholarship"]) {
            SCHOLARSHIP_ANSWER.to_string()
        } else if has(&["application", "apply"]) {
            APPLICATION_ANSWER.to_string()
        } else {
            format!(
                "I understand you're asking about \"{}\". I can help with university selection, the application process and visa requirements. What would you like to know specifically?",
                message
            )
        };

        if level == AiSupport::Premium {
            answer.push_str("\n\nAs a Global member, you can also reach an advisor through priority support.");
        }
        answer
    }
}

#[async_trait]
impl ChatResponder for KeywordResponder {
    async fn respond(
        &self,
        message: &str,
        _history: &[ChatMessage],
        level: AiSupport,
    ) -> anyhow::Result<String> {
        Ok(Self::answer(message, level))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub conversation_id: String,
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

pub struct ChatService {
    repo: Arc<dyn ChatRepository>,
    responder: Arc<dyn ChatResponder>,
}

impl ChatService {
    pub fn new(repo: Arc<dyn ChatRepository>, responder: Arc<dyn ChatResponder>) -> Self {
        Self { repo, responder }
    }

    async fn get_owned(&self, user_id: &str, id: &str) -> ServiceResult<Conversation> {
        self.repo
            .get_conversation(id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| {
                ServiceError::not_found("CONVERSATION_NOT_FOUND", "Conversation not found")
            })
    }

    pub async fn send(
        &self,
        user: &User,
        message: Option<&str>,
        conversation_id: Option<&str>,
    ) -> ServiceResult<ChatReply> {
        let mut v = Validator::new();
        v.required("message", message);
        let text = message.map(str::trim).unwrap_or_default();
        if text.chars().count() > MAX_MESSAGE_CHARS {
            v.error(
                "message",
                format!("Must be at most {} characters", MAX_MESSAGE_CHARS),
            );
        }
        v.finish()?;

        let conversation = match conversation_id.map(str::trim).filter(|c| !c.is_empty()) {
            Some(id) => self.get_owned(&user.id, id).await?,
            None => {
                self.repo
                    .create_conversation(&Conversation::new(user.id.clone(), text))
                    .await?
            }
        };

        self.repo
            .add_message(&ChatMessage::new(
                conversation.id.clone(),
                ChatRole::User,
                text.to_string(),
            ))
            .await?;

        let history = self.repo.messages(&conversation.id).await?;
        let level = user.effective_tier(Utc::now()).features().ai_support;
        let answer = self.responder.respond(text, &history, level).await?;

        let reply = self
            .repo
            .add_message(&ChatMessage::new(
                conversation.id.clone(),
                ChatRole::Assistant,
                answer,
            ))
            .await?;
        self.repo.touch(&conversation.id, reply.created_at).await?;

        Ok(ChatReply {
            conversation_id: conversation.id,
            message: reply,
        })
    }

    pub async fn conversations(
        &self,
        user_id: &str,
        page: Pagination,
    ) -> ServiceResult<(Vec<ConversationSummary>, PageMeta)> {
        let items = self
            .repo
            .list_conversations(user_id, page.limit, page.offset())
            .await?;
        let total = self.repo.count_conversations(user_id).await?;
        Ok((items, page.meta(total)))
    }

    pub async fn conversation(&self, user_id: &str, id: &str) -> ServiceResult<ConversationDetail> {
        let conversation = self.get_owned(user_id, id).await?;
        let messages = self.repo.messages(id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> ServiceResult<()> {
        self.get_owned(user_id, id).await?;
        self.repo.delete_conversation(id).await?;
        Ok(())
    }
}
