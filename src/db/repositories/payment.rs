//! Payment repository

use crate::db::DynDatabasePool;
use crate::models::{Payment, PaymentStatus, PaymentWithPlan};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: &Payment) -> Result<Payment>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Payment>>;

    /// Whether a completed payment exists for the subscription
    async fn has_completed_for_subscription(&self, subscription_id: &str) -> Result<bool>;

    /// Mark completed now, merging the verification payload
    async fn complete(&self, id: &str, payment_data: Option<&str>) -> Result<()>;

    /// User's payments with plan, newest first
    async fn history(&self, user_id: &str, limit: i64, offset: i64) -> Result<Vec<PaymentWithPlan>>;

    async fn count_for_user(&self, user_id: &str) -> Result<i64>;
}

pub struct SqlxPaymentRepository {
    pool: DynDatabasePool,
}

impl SqlxPaymentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PaymentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PaymentRepository for SqlxPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<Payment> {
        let p = payment;
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                INSERT INTO payments (id, user_id, subscription_id, amount, currency,
                    payment_method, status, transaction_id, payment_data, completed_at,
                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&p.id)
            .bind(&p.user_id)
            .bind(&p.subscription_id)
            .bind(p.amount)
            .bind(&p.currency)
            .bind(p.payment_method.as_str())
            .bind(p.status.as_str())
            .bind(&p.transaction_id)
            .bind(&p.payment_data)
            .bind(p.completed_at)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to create payment")
        })?;
        Ok(payment.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Payment>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get payment")
        })
    }

    async fn has_completed_for_subscription(&self, subscription_id: &str) -> Result<bool> {
        let count = with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM payments WHERE subscription_id = ? AND status = ?",
            )
            .bind(subscription_id)
            .bind(PaymentStatus::Completed.as_str())
            .fetch_one(pool)
            .await
            .context("Failed to check subscription payments")
        })?;
        Ok(count > 0)
    }

    async fn complete(&self, id: &str, payment_data: Option<&str>) -> Result<()> {
        let now = Utc::now();
        with_pool!(self.pool, |pool| {
            sqlx::query(
                r#"
                UPDATE payments SET status = ?, completed_at = ?, updated_at = ?,
                    payment_data = COALESCE(?, payment_data)
                WHERE id = ?
                "#,
            )
            .bind(PaymentStatus::Completed.as_str())
            .bind(now)
            .bind(now)
            .bind(payment_data)
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .context("Failed to complete payment")
        })?;
        Ok(())
    }

    async fn history(&self, user_id: &str, limit: i64, offset: i64) -> Result<Vec<PaymentWithPlan>> {
        with_pool!(self.pool, |pool| {
            sqlx::query_as::<_, PaymentWithPlan>(
                r#"
                SELECT p.*, s.plan_id AS plan_id
                FROM payments p
                LEFT JOIN subscriptions s ON s.id = p.subscription_id
                WHERE p.user_id = ?
                ORDER BY p.created_at DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .context("Failed to load payment history")
        })
    }

    async fn count_for_user(&self, user_id: &str) -> Result<i64> {
        with_pool!(self.pool, |pool| {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payments WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count payments")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxSubscriptionRepository, SqlxUserRepository, SubscriptionRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{PaymentMethod, Subscription, SubscriptionStatus, SubscriptionTier, User};

    #[tokio::test]
    async fn test_payment_completion_and_history() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user = User::new("pay@example.com".into(), "h".into(), "Payer".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();

        let now = Utc::now();
        let sub = Subscription {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            plan_id: SubscriptionTier::Asia,
            status: SubscriptionStatus::Pending,
            amount: 25.0,
            currency: "USD".into(),
            payment_method: PaymentMethod::CreditCard,
            starts_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        SqlxSubscriptionRepository::new(pool.clone()).create(&sub).await.unwrap();

        let repo = SqlxPaymentRepository::new(pool);
        let mut payment = Payment::new(
            user.id.clone(),
            Some(sub.id.clone()),
            25.0,
            "USD".into(),
            PaymentMethod::CreditCard,
        );
        payment.payment_data = Some(r#"{"gateway":"card"}"#.into());
        repo.create(&payment).await.unwrap();
        assert!(!repo.has_completed_for_subscription(&sub.id).await.unwrap());

        repo.complete(&payment.id, None).await.unwrap();
        let stored = repo.get_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.payment_data.as_deref(), Some(r#"{"gateway":"card"}"#));
        assert!(repo.has_completed_for_subscription(&sub.id).await.unwrap());

        let history = repo.history(&user.id, 10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].plan_id.as_deref(), Some("asia"));
        assert_eq!(repo.count_for_user(&user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transaction_id_unique() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user = User::new("u@example.com".into(), "h".into(), "U".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();
        let repo = SqlxPaymentRepository::new(pool);

        let first = Payment::new(user.id.clone(), None, 1.0, "USD".into(), PaymentMethod::MyxnToken);
        let mut second = first.clone();
        second.id = uuid::Uuid::new_v4().to_string();
        repo.create(&first).await.unwrap();
        assert!(repo.create(&second).await.is_err());
    }
}
