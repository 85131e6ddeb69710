//! Blog repository
//!
//! Posts plus the two taxonomies (categories and tags). Both taxonomies have
//! the same shape, so they are addressed through [`TermKind`] rather than
//! duplicated query sets.

use crate::bind_args;
use crate::db::repositories::Conditions;
use crate::db::DynDatabasePool;
use crate::models::{BlogPost, Paged, PostStatus, Term, TermWithCount};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Which taxonomy a term belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Category,
    Tag,
}

impl TermKind {
    fn table(&self) -> &'static str {
        match self {
            TermKind::Category => "blog_categories",
            TermKind::Tag => "blog_tags",
        }
    }

    fn join_table(&self) -> &'static str {
        match self {
            TermKind::Category => "blog_post_categories",
            TermKind::Tag => "blog_post_tags",
        }
    }

    fn join_column(&self) -> &'static str {
        match self {
            TermKind::Category => "category_id",
            TermKind::Tag => "tag_id",
        }
    }
}

/// Filters for post listings
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub query: Option<String>,
}

impl PostFilter {
    pub fn published() -> Self {
        Self {
            status: Some(PostStatus::Published),
            ..Default::default()
        }
    }

    fn conditions(&self) -> Conditions {
        let mut conditions = Conditions::new();
        if let Some(status) = self.status {
            conditions.push("status = ?", status.as_str());
        }
        for (kind, slug) in [
            (TermKind::Category, &self.category),
            (TermKind::Tag, &self.tag),
        ] {
            if let Some(slug) = slug {
                let clause = format!(
                    "id IN (SELECT j.post_id FROM {} j JOIN {} t ON t.id = j.{} WHERE t.slug = ?)",
                    kind.join_table(),
                    kind.table(),
                    kind.join_column()
                );
                conditions.push(&clause, slug.as_str());
            }
        }
        if let Some(q) = &self.query {
            conditions.search(&["title", "content", "excerpt"], q);
        }
        conditions
    }
}

#[async_trait]
pub trait BlogRepository: Send + Sync {
    async fn create_post(&self, post: &BlogPost) -> Result<BlogPost>;

    async fn update_post(&self, post: &BlogPost) -> Result<BlogPost>;

    async fn get_by_id(&self, id: &str) -> Result<Option<BlogPost>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>>;

    /// Whether `slug` is taken by a post other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<&str>) -> Result<bool>;

    async fn delete_post(&self, id: &str) -> Result<bool>;

    /// Newest first by publish time, then creation time
    async fn list_posts(&self, filter: &PostFilter, limit: i64, offset: i64)
        -> Result<Paged<BlogPost>>;

    async fn increment_views(&self, id: &str) -> Result<()>;

    /// Published posts sharing at least one category with `post_id`
    async fn related(&self, post_id: &str, limit: i64) -> Result<Vec<BlogPost>>;

    /// (slug, last modified) of every published post
    async fn published_slugs(&self) -> Result<Vec<(String, DateTime<Utc>)>>;

    /// Find a term by slug, creating it with `name` when missing
    async fn ensure_term(&self, kind: TermKind, slug: &str, name: &str) -> Result<Term>;

    /// Replace the post's links for one taxonomy
    async fn set_post_terms(&self, kind: TermKind, post_id: &str, term_ids: &[String])
        -> Result<()>;

    async fn terms_for_post(&self, kind: TermKind, post_id: &str) -> Result<Vec<Term>>;

    /// Terms with published post counts, most used first
    async fn terms_with_counts(&self, kind: TermKind, limit: i64) -> Result<Vec<TermWithCount>>;
}

pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_term_by_slug(&self, kind: TermKind, slug: &str) -> Result<Option<Term>> {
        let sql = format!(
            "SELECT id, slug, name, created_at FROM {} WHERE slug = ?",
            kind.table()
        );
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Term>(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get term")
        })
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create_post(&self, post: &BlogPost) -> Result<BlogPost> {
        let p = post;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO blog_posts (id, slug, title, content, content_html, excerpt,
                    featured_image, author_id, status, published_at, view_count, reading_time,
                    meta_title, meta_description, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&p.id)
            .bind(&p.slug)
            .bind(&p.title)
            .bind(&p.content)
            .bind(&p.content_html)
            .bind(&p.excerpt)
            .bind(&p.featured_image)
            .bind(&p.author_id)
            .bind(p.status.as_str())
            .bind(p.published_at)
            .bind(p.view_count)
            .bind(p.reading_time)
            .bind(&p.meta_title)
            .bind(&p.meta_description)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create post")
        })?;
        Ok(post.clone())
    }

    async fn update_post(&self, post: &BlogPost) -> Result<BlogPost> {
        let p = post;
        let now = Utc::now();
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE blog_posts SET slug = ?, title = ?, content = ?, content_html = ?,
                    excerpt = ?, featured_image = ?, status = ?, published_at = ?,
                    reading_time = ?, meta_title = ?, meta_description = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&p.slug)
            .bind(&p.title)
            .bind(&p.content)
            .bind(&p.content_html)
            .bind(&p.excerpt)
            .bind(&p.featured_image)
            .bind(p.status.as_str())
            .bind(p.published_at)
            .bind(p.reading_time)
            .bind(&p.meta_title)
            .bind(&p.meta_description)
            .bind(now)
            .bind(&p.id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to update post")
        })?;

        let mut updated = post.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<BlogPost>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, BlogPost>("SELECT * FROM blog_posts WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get post")
        })
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, BlogPost>("SELECT * FROM blog_posts WHERE slug = ?")
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get post by slug")
        })
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<&str>) -> Result<bool> {
        let count = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM blog_posts WHERE slug = ? AND id <> ?",
            )
            .bind(slug)
            .bind(exclude_id.unwrap_or(""))
            .fetch_one(pool)
            .await
            .context("Failed to check slug")
        })?;
        Ok(count > 0)
    }

    async fn delete_post(&self, id: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |pool| {
            sqlx::query("DELETE FROM blog_posts WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to delete post")
        })?;
        Ok(affected > 0)
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Paged<BlogPost>> {
        let conditions = filter.conditions();
        let where_sql = conditions.to_sql();
        let list_sql = format!(
            "SELECT * FROM blog_posts{} ORDER BY published_at IS NULL, published_at DESC, created_at DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM blog_posts{}", where_sql);

        with_pool!(self.pool, |pool| {
            let items = bind_args!(sqlx::query_as::<_, BlogPost>(&list_sql), conditions.args())
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
                .context("Failed to list posts")?;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), conditions.args())
                .fetch_one(pool)
                .await
                .context("Failed to count posts")?;
            Ok(Paged { items, total })
        })
    }

    async fn increment_views(&self, id: &str) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query("UPDATE blog_posts SET view_count = view_count + 1 WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to increment view count")
        })?;
        Ok(())
    }

    async fn related(&self, post_id: &str, limit: i64) -> Result<Vec<BlogPost>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, BlogPost>(
                r#"
                SELECT * FROM blog_posts
                WHERE status = ? AND id <> ? AND id IN (
                    SELECT pc.post_id FROM blog_post_categories pc
                    WHERE pc.category_id IN (
                        SELECT category_id FROM blog_post_categories WHERE post_id = ?
                    )
                )
                ORDER BY published_at DESC
                LIMIT ?
                "#,
            )
            .bind(PostStatus::Published.as_str())
            .bind(post_id)
            .bind(post_id)
            .bind(limit)
            .fetch_all(pool)
            .await
            .context("Failed to load related posts")
        })
    }

    async fn published_slugs(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, (String, DateTime<Utc>)>(
                "SELECT slug, updated_at FROM blog_posts WHERE status = ? ORDER BY published_at DESC",
            )
            .bind(PostStatus::Published.as_str())
            .fetch_all(pool)
            .await
            .context("Failed to list published slugs")
        })
    }

    async fn ensure_term(&self, kind: TermKind, slug: &str, name: &str) -> Result<Term> {
        if let Some(term) = self.get_term_by_slug(kind, slug).await? {
            return Ok(term);
        }

        let term = Term::new(slug.to_string(), name.to_string());
        let sql = format!(
            "INSERT INTO {} (id, slug, name, created_at) VALUES (?, ?, ?, ?)",
            kind.table()
        );
        with_pool!(self.pool, |pool| {
            sqlx::query(&sql)
                .bind(&term.id)
                .bind(&term.slug)
                .bind(&term.name)
                .bind(term.created_at)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to create term")
        })?;
        Ok(term)
    }

    async fn set_post_terms(
        &self,
        kind: TermKind,
        post_id: &str,
        term_ids: &[String],
    ) -> Result<()> {
        let delete_sql = format!("DELETE FROM {} WHERE post_id = ?", kind.join_table());
        let insert_sql = format!(
            "INSERT INTO {} (post_id, {}) VALUES (?, ?)",
            kind.join_table(),
            kind.join_column()
        );

        with_pool!(self.pool, |pool| {
            let mut tx = pool.begin().await.context("Failed to begin transaction")?;
            sqlx::query(&delete_sql)
                .bind(post_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear post terms")?;
            for term_id in term_ids {
                sqlx::query(&insert_sql)
                    .bind(post_id)
                    .bind(term_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to link post term")?;
            }
            tx.commit().await.context("Failed to commit post terms")
        })
    }

    async fn terms_for_post(&self, kind: TermKind, post_id: &str) -> Result<Vec<Term>> {
        let sql = format!(
            "SELECT t.id, t.slug, t.name, t.created_at FROM {} t JOIN {} j ON j.{} = t.id WHERE j.post_id = ? ORDER BY t.name",
            kind.table(),
            kind.join_table(),
            kind.join_column()
        );
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Term>(&sql)
                .bind(post_id)
                .fetch_all(pool)
                .await
                .context("Failed to load post terms")
        })
    }

    async fn terms_with_counts(&self, kind: TermKind, limit: i64) -> Result<Vec<TermWithCount>> {
        let sql = format!(
            r#"
            SELECT t.id, t.slug, t.name, t.created_at, COUNT(p.id) AS post_count
            FROM {table} t
            LEFT JOIN {join} j ON j.{column} = t.id
            LEFT JOIN blog_posts p ON p.id = j.post_id AND p.status = ?
            GROUP BY t.id, t.slug, t.name, t.created_at
            ORDER BY post_count DESC, t.name ASC
            LIMIT ?
            "#,
            table = kind.table(),
            join = kind.join_table(),
            column = kind.join_column()
        );
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, TermWithCount>(&sql)
                .bind(PostStatus::Published.as_str())
                .bind(limit)
                .fetch_all(pool)
                .await
                .context("Failed to count terms")
        })
    }
}
