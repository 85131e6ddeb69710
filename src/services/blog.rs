//! Blog service
//!
//! Posts are written in markdown. The source is stripped of script content
//! on the way in, and the rendered HTML is stored next to it so readers
//! never pay for rendering.

use chrono::Utc;
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

use super::validation::{sanitize_html, sanitize_opt, sanitize_text, PageMeta, Pagination, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::{BlogRepository, PostFilter, TermKind};
use crate::models::{BlogPost, PostStatus, Term, TermWithCount, User};

const WORDS_PER_MINUTE: usize = 200;
const EXCERPT_CHARS: usize = 150;
const MAX_SLUG_CHARS: usize = 100;
const RELATED_POSTS: i64 = 3;
const TOP_TAGS: i64 = 20;
const MAX_CATEGORIES: i64 = 500;

/// URL-friendly slug: lowercase words joined by single dashes
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in title.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '_' || c == '-' {
            pending_dash = true;
        }
    }
    let truncated: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    truncated.trim_end_matches('-').to_string()
}

/// Minutes to read at 200 words per minute, at least one
pub fn reading_time(content: &str) -> i32 {
    let words = content.split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

/// Plain-text preview of markdown content
pub fn excerpt(content: &str) -> String {
    let mut text = String::new();
    let mut in_code_block = false;
    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Text(t) | Event::Code(t) if !in_code_block => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak | Event::End(_) => text.push(' '),
            _ => {}
        }
    }
    let plain = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if plain.chars().count() <= EXCERPT_CHARS {
        return plain;
    }
    let cut: String = plain.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Render markdown to HTML, with script content removed from the output
pub fn render_markdown(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(content, options));
    sanitize_html(&out)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub slug: Option<String>,
    pub status: Option<String>,
    pub categories: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub featured_image: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

/// Partial update; `categories`/`tags` replace the existing links when present
pub type UpdatePostInput = CreatePostInput;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: BlogPost,
    pub categories: Vec<Term>,
    pub tags: Vec<Term>,
}

fn validate_post(input: &CreatePostInput, creating: bool) -> ServiceResult<Option<PostStatus>> {
    let mut v = Validator::new();
    if creating || input.title.is_some() {
        v.required("title", input.title.as_deref());
    }
    if creating || input.content.is_some() {
        v.required("content", input.content.as_deref());
    }
    if let Some(title) = input.title.as_deref() {
        v.max_len("title", title, 255);
    }
    if let Some(description) = input.meta_description.as_deref() {
        v.max_len("metaDescription", description, 160);
    }
    let status = input.status.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if let Some(status) = status {
        v.one_of("status", status, &PostStatus::names());
    }
    v.finish()?;
    Ok(status.and_then(|s| s.parse().ok()))
}

pub struct BlogService {
    repo: Arc<dyn BlogRepository>,
    base_url: String,
}

impl BlogService {
    pub fn new(repo: Arc<dyn BlogRepository>, base_url: &str) -> Self {
        Self {
            repo,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn detail(&self, post: BlogPost) -> ServiceResult<PostDetail> {
        let categories = self.repo.terms_for_post(TermKind::Category, &post.id).await?;
        let tags = self.repo.terms_for_post(TermKind::Tag, &post.id).await?;
        Ok(PostDetail {
            post,
            categories,
            tags,
        })
    }

    /// Link `names` to the post, creating terms by slug as needed
    async fn link_terms(&self, kind: TermKind, post_id: &str, names: &[String]) -> ServiceResult<()> {
        let mut ids = Vec::new();
        for name in names {
            let slug = generate_slug(name.trim());
            if slug.is_empty() {
                continue;
            }
            let term = self
                .repo
                .ensure_term(kind, &slug, &sanitize_text(name.trim()))
                .await?;
            if !ids.contains(&term.id) {
                ids.push(term.id);
            }
        }
        self.repo.set_post_terms(kind, post_id, &ids).await?;
        Ok(())
    }

    async fn ensure_slug_free(&self, slug: &str, exclude_id: Option<&str>) -> ServiceResult<()> {
        if slug.is_empty() {
            return Err(ServiceError::invalid_field("slug", "Slug must contain letters or digits"));
        }
        if self.repo.slug_exists(slug, exclude_id).await? {
            return Err(ServiceError::bad_request(
                "SLUG_EXISTS",
                "This slug is already in use",
            ));
        }
        Ok(())
    }

    pub async fn list_published(
        &self,
        category: Option<&str>,
        tag: Option<&str>,
        query: Option<&str>,
        page: Pagination,
    ) -> ServiceResult<(Vec<BlogPost>, PageMeta)> {
        let non_blank = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        let filter = PostFilter {
            category: non_blank(category),
            tag: non_blank(tag),
            query: non_blank(query),
            ..PostFilter::published()
        };
        let result = self.repo.list_posts(&filter, page.limit, page.offset()).await?;
        Ok((result.items, page.meta(result.total)))
    }

    pub async fn search(&self, query: Option<&str>, page: Pagination) -> ServiceResult<(Vec<BlogPost>, PageMeta)> {
        let q = query.map(str::trim).unwrap_or_default();
        let mut v = Validator::new();
        v.min_len("q", q, 2);
        v.finish()?;
        self.list_published(None, None, Some(q), page).await
    }

    /// Published post by slug; counts as a view
    pub async fn view(&self, slug: &str) -> ServiceResult<PostDetail> {
        let mut post = self
            .repo
            .get_by_slug(slug)
            .await?
            .filter(|p| p.status == PostStatus::Published)
            .ok_or_else(not_found)?;
        self.repo.increment_views(&post.id).await?;
        post.view_count += 1;
        self.detail(post).await
    }

    pub async fn related(&self, slug: &str) -> ServiceResult<Vec<BlogPost>> {
        let post = self
            .repo
            .get_by_slug(slug)
            .await?
            .filter(|p| p.status == PostStatus::Published)
            .ok_or_else(not_found)?;
        Ok(self.repo.related(&post.id, RELATED_POSTS).await?)
    }

    pub async fn categories(&self) -> ServiceResult<Vec<TermWithCount>> {
        Ok(self
            .repo
            .terms_with_counts(TermKind::Category, MAX_CATEGORIES)
            .await?)
    }

    pub async fn tags(&self) -> ServiceResult<Vec<TermWithCount>> {
        Ok(self.repo.terms_with_counts(TermKind::Tag, TOP_TAGS).await?)
    }

    pub async fn sitemap(&self) -> ServiceResult<String> {
        let posts = self.repo.published_slugs().await?;

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
        let _ = write!(
            xml,
            "  <url>\n    <loc>{}/blog</loc>\n    <changefreq>daily</changefreq>\n    <priority>0.8</priority>\n  </url>\n",
            self.base_url
        );
        for (slug, modified) in posts {
            let _ = write!(
                xml,
                "  <url>\n    <loc>{}/blog/{}</loc>\n    <lastmod>{}</lastmod>\n    <changefreq>weekly</changefreq>\n    <priority>0.6</priority>\n  </url>\n",
                self.base_url,
                slug,
                modified.format("%Y-%m-%d")
            );
        }
        xml.push_str("</urlset>");
        Ok(xml)
    }

    pub async fn create(&self, author: &User, input: CreatePostInput) -> ServiceResult<PostDetail> {
        let status = validate_post(&input, true)?.unwrap_or_default();

        let raw_title = input.title.as_deref().unwrap_or_default().trim();
        let title = sanitize_text(raw_title);
        let content = sanitize_html(input.content.as_deref().unwrap_or_default().trim());
        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(custom) => generate_slug(custom),
            None => generate_slug(raw_title),
        };
        self.ensure_slug_free(&slug, None).await?;

        let mut post = BlogPost::new(slug, title, content.clone(), render_markdown(&content), status);
        post.excerpt = sanitize_opt(input.excerpt.as_deref()).or_else(|| Some(excerpt(&content)));
        post.reading_time = reading_time(&content);
        post.author_id = Some(author.id.clone());
        post.featured_image = input.featured_image.map(|i| i.trim().to_string()).filter(|i| !i.is_empty());
        post.meta_title = sanitize_opt(input.meta_title.as_deref());
        post.meta_description = sanitize_opt(input.meta_description.as_deref());

        let post = self.repo.create_post(&post).await?;
        if let Some(categories) = &input.categories {
            self.link_terms(TermKind::Category, &post.id, categories).await?;
        }
        if let Some(tags) = &input.tags {
            self.link_terms(TermKind::Tag, &post.id, tags).await?;
        }

        tracing::info!("Blog post {} created ({})", post.slug, post.status);
        self.detail(post).await
    }

    pub async fn update(&self, id: &str, input: UpdatePostInput) -> ServiceResult<PostDetail> {
        let status = validate_post(&input, false)?;
        let mut post = self.repo.get_by_id(id).await?.ok_or_else(not_found)?;

        if let Some(title) = input.title.as_deref() {
            post.title = sanitize_text(title);
        }
        if let Some(slug) = input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let slug = generate_slug(slug);
            if slug != post.slug {
                self.ensure_slug_free(&slug, Some(id)).await?;
                post.slug = slug;
            }
        }
        if let Some(content) = input.content.as_deref() {
            post.content = sanitize_html(content.trim());
            post.content_html = render_markdown(&post.content);
            post.reading_time = reading_time(&post.content);
            if input.excerpt.is_none() {
                post.excerpt = Some(excerpt(&post.content));
            }
        }
        if let Some(text) = input.excerpt.as_deref() {
            post.excerpt = sanitize_opt(Some(text));
        }
        if let Some(status) = status {
            if status == PostStatus::Published && post.published_at.is_none() {
                post.published_at = Some(Utc::now());
            }
            post.status = status;
        }
        if let Some(image) = input.featured_image {
            post.featured_image = Some(image.trim().to_string()).filter(|i| !i.is_empty());
        }
        if let Some(meta_title) = input.meta_title.as_deref() {
            post.meta_title = sanitize_opt(Some(meta_title));
        }
        if let Some(meta_description) = input.meta_description.as_deref() {
            post.meta_description = sanitize_opt(Some(meta_description));
        }

        let post = self.repo.update_post(&post).await?;
        if let Some(categories) = &input.categories {
            self.link_terms(TermKind::Category, &post.id, categories).await?;
        }
        if let Some(tags) = &input.tags {
            self.link_terms(TermKind::Tag, &post.id, tags).await?;
        }
        self.detail(post).await
    }

    pub async fn publish(&self, id: &str) -> ServiceResult<BlogPost> {
        let mut post = self.repo.get_by_id(id).await?.ok_or_else(not_found)?;
        post.status = PostStatus::Published;
        if post.published_at.is_none() {
            post.published_at = Some(Utc::now());
        }
        Ok(self.repo.update_post(&post).await?)
    }

    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        if !self.repo.delete_post(id).await? {
            return Err(not_found());
        }
        Ok(())
    }

    pub async fn drafts(&self, page: Pagination) -> ServiceResult<(Vec<BlogPost>, PageMeta)> {
        let filter = PostFilter {
            status: Some(PostStatus::Draft),
            ..Default::default()
        };
        let result = self.repo.list_posts(&filter, page.limit, page.offset()).await?;
        Ok((result.items, page.meta(result.total)))
    }
}

fn not_found() -> ServiceError {
    ServiceError::not_found("POST_NOT_FOUND", "Post not found")
}
