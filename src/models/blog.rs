//! Blog model
//!
//! This module provides:
//! - `BlogPost` entity with markdown source and rendered HTML
//! - `PostStatus` publication states
//! - `Term`, the shared shape of blog categories and tags

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Post publication status
    pub enum PostStatus {
        /// Not visible to the public
        Draft => "draft",
        Published => "published",
        /// Queued for a later publish
        Scheduled => "scheduled",
    }
}

impl Default for PostStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// Blog post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: String,
    /// URL-friendly slug
    pub slug: String,
    pub title: String,
    /// Markdown content
    pub content: String,
    /// Rendered HTML content
    pub content_html: String,
    pub excerpt: Option<String>,
    pub featured_image: Option<String>,
    pub author_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i32,
    /// Estimated minutes to read
    pub reading_time: i32,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlogPost {
    pub fn new(
        slug: String,
        title: String,
        content: String,
        content_html: String,
        status: PostStatus,
    ) -> Self {
        let now = Utc::now();
        let published_at = if status == PostStatus::Published {
            Some(now)
        } else {
            None
        };

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug,
            title,
            content,
            content_html,
            excerpt: None,
            featured_image: None,
            author_id: None,
            status,
            published_at,
            view_count: 0,
            reading_time: 1,
            meta_title: None,
            meta_description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Blog category or tag
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Term {
    pub fn new(slug: String, name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug,
            name,
            created_at: Utc::now(),
        }
    }
}

/// Term with the number of published posts using it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TermWithCount {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub term: Term,
    pub post_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_post_gets_timestamp() {
        let post = BlogPost::new(
            "hello".into(),
            "Hello".into(),
            "# Hi".into(),
            "<h1>Hi</h1>".into(),
            PostStatus::Published,
        );
        assert!(post.published_at.is_some());

        let draft = BlogPost::new(
            "d".into(),
            "D".into(),
            String::new(),
            String::new(),
            PostStatus::default(),
        );
        assert_eq!(draft.status, PostStatus::Draft);
        assert!(draft.published_at.is_none());
    }
}
