//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::DynDatabasePool;
use crate::models::{SubscriptionTier, User};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Get user by (lowercased) email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get user holding a password reset token hash
    async fn get_by_reset_token(&self, token_hash: &str) -> Result<Option<User>>;

    /// Persist every mutable column of `user`
    async fn update(&self, user: &User) -> Result<User>;

    /// Set tier and expiry
    async fn set_subscription(
        &self,
        id: &str,
        tier: SubscriptionTier,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Atomically bump the free-tier application counter
    async fn increment_free_applications(&self, id: &str) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO users (id, email, password_hash, full_name, phone, country,
                    date_of_birth, address, academic_level, profile_complete, subscription_type,
                    subscription_expires_at, free_applications_used, role, is_active,
                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(&user.phone)
            .bind(&user.country)
            .bind(user.date_of_birth)
            .bind(&user.address)
            .bind(&user.academic_level)
            .bind(user.profile_complete)
            .bind(user.subscription_type.as_str())
            .bind(user.subscription_expires_at)
            .bind(user.free_applications_used)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create user")
        })?;

        Ok(user.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get user by ID")
        })
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(pool)
                .await
                .context("Failed to get user by email")
        })
    }

    async fn get_by_reset_token(&self, token_hash: &str) -> Result<Option<User>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE reset_token_hash = ?")
                .bind(token_hash)
                .fetch_optional(pool)
                .await
                .context("Failed to get user by reset token")
        })
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE users SET email = ?, password_hash = ?, full_name = ?, phone = ?,
                    country = ?, date_of_birth = ?, address = ?, academic_level = ?,
                    profile_complete = ?, subscription_type = ?, subscription_expires_at = ?,
                    role = ?, is_active = ?, reset_token_hash = ?, reset_token_expires_at = ?,
                    last_login_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(&user.phone)
            .bind(&user.country)
            .bind(user.date_of_birth)
            .bind(&user.address)
            .bind(&user.academic_level)
            .bind(user.profile_complete)
            .bind(user.subscription_type.as_str())
            .bind(user.subscription_expires_at)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(&user.reset_token_hash)
            .bind(user.reset_token_expires_at)
            .bind(user.last_login_at)
            .bind(now)
            .bind(&user.id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to update user")
        })?;

        let mut updated = user.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    async fn set_subscription(
        &self,
        id: &str,
        tier: SubscriptionTier,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "UPDATE users SET subscription_type = ?, subscription_expires_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(tier.as_str())
            .bind(expires_at)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to update user subscription")
        })?;
        Ok(())
    }

    async fn increment_free_applications(&self, id: &str) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "UPDATE users SET free_applications_used = free_applications_used + 1 WHERE id = ?",
            )
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to increment free applications")
        })?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(pool)
                .await
                .context("Failed to count users")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::{Duration, NaiveDate};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(email: &str) -> User {
        User::new(email.to_string(), "hash".to_string(), "Test User".to_string())
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;
        let mut user = test_user("a@example.com");
        user.date_of_birth = NaiveDate::from_ymd_opt(2000, 1, 31);
        repo.create(&user).await.expect("Failed to create user");

        let by_id = repo.get_by_id(&user.id).await.unwrap().expect("User should exist");
        assert_eq!(by_id.email, "a@example.com");
        assert_eq!(by_id.date_of_birth, user.date_of_birth);
        assert_eq!(by_id.subscription_type, SubscriptionTier::Free);

        let by_email = repo.get_by_email("a@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));
        assert!(repo.get_by_email("missing@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("dup@example.com")).await.unwrap();
        let err = repo.create(&test_user("dup@example.com")).await.unwrap_err();

        let db_err = err
            .chain()
            .find_map(|e| e.downcast_ref::<sqlx::Error>())
            .and_then(|e| e.as_database_error())
            .expect("should be a database error");
        assert!(db_err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_update_and_reset_token_lookup() {
        let repo = setup_test_repo().await;
        let mut user = test_user("reset@example.com");
        repo.create(&user).await.unwrap();

        user.full_name = "Renamed".to_string();
        user.reset_token_hash = Some("abc123".to_string());
        user.reset_token_expires_at = Some(Utc::now() + Duration::hours(1));
        repo.update(&user).await.unwrap();

        let found = repo.get_by_reset_token("abc123").await.unwrap().unwrap();
        assert_eq!(found.full_name, "Renamed");
        assert!(found.reset_token_expires_at.is_some());
    }

    #[tokio::test]
    async fn test_subscription_and_counter() {
        let repo = setup_test_repo().await;
        let user = test_user("tier@example.com");
        repo.create(&user).await.unwrap();

        let expiry = Utc::now() + Duration::days(700);
        repo.set_subscription(&user.id, SubscriptionTier::Asia, Some(expiry))
            .await
            .unwrap();
        repo.increment_free_applications(&user.id).await.unwrap();
        repo.increment_free_applications(&user.id).await.unwrap();

        let found = repo.get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(found.subscription_type, SubscriptionTier::Asia);
        assert_eq!(found.free_applications_used, 2);
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
