//! Subscription repository

use crate::db::DynDatabasePool;
use crate::models::{Subscription, SubscriptionStatus};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Subscription>>;

    /// User's subscriptions, newest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Subscription>>;

    /// Mark active with the given validity window
    async fn activate(
        &self,
        id: &str,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_status(&self, id: &str, status: SubscriptionStatus) -> Result<()>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription> {
        let s = subscription;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO subscriptions (id, user_id, plan_id, status, amount, currency,
                    payment_method, starts_at, expires_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&s.id)
            .bind(&s.user_id)
            .bind(s.plan_id.as_str())
            .bind(s.status.as_str())
            .bind(s.amount)
            .bind(&s.currency)
            .bind(s.payment_method.as_str())
            .bind(s.starts_at)
            .bind(s.expires_at)
            .bind(s.created_at)
            .bind(s.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create subscription")
        })?;
        Ok(subscription.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Subscription>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get subscription")
        })
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Subscription>(
                "SELECT * FROM subscriptions WHERE user_id = ? ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
            .context("Failed to list subscriptions")
        })
    }

    async fn activate(
        &self,
        id: &str,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query(
                "UPDATE subscriptions SET status = ?, starts_at = ?, expires_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(SubscriptionStatus::Active.as_str())
            .bind(starts_at)
            .bind(expires_at)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to activate subscription")
        })?;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: SubscriptionStatus) -> Result<()> {
        with_pool!(self.pool, |pool| {
            sqlx::query("UPDATE subscriptions SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .context("Failed to update subscription status")
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{PaymentMethod, SubscriptionTier, User};
    use chrono::Duration;

    fn subscription(user_id: &str, tier: SubscriptionTier) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            plan_id: tier,
            status: SubscriptionStatus::Pending,
            amount: 50.0,
            currency: "USD".into(),
            payment_method: PaymentMethod::BankTransfer,
            starts_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user = User::new("sub@example.com".into(), "h".into(), "Sub".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();
        let repo = SqlxSubscriptionRepository::new(pool);

        let sub = subscription(&user.id, SubscriptionTier::Europe);
        repo.create(&sub).await.unwrap();

        let start = Utc::now();
        repo.activate(&sub.id, start, start + Duration::days(730))
            .await
            .unwrap();
        let found = repo.get_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(found.status, SubscriptionStatus::Active);
        assert_eq!(found.plan_id, SubscriptionTier::Europe);
        assert!(found.expires_at.unwrap() > start);

        repo.set_status(&sub.id, SubscriptionStatus::Expired).await.unwrap();
        let listed = repo.list_for_user(&user.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, SubscriptionStatus::Expired);
    }
}
