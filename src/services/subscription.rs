//! Subscription service
//!
//! Plan purchase and activation. Activating a subscription is the only place
//! a user's tier is raised; payments reach it through
//! [`SubscriptionService::activate_paid`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::email::EmailService;
use super::validation::Validator;
use super::{ServiceError, ServiceResult};
use crate::db::repositories::{PaymentRepository, SubscriptionRepository, UserRepository};
use crate::models::{
    plan_expiry, PaymentMethod, Plan, PlanFeatures, Subscription, SubscriptionStatus,
    SubscriptionTier, User,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionInput {
    pub plan_id: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCreated {
    pub subscription: Subscription,
    pub payment_url: String,
}

/// What the user holds right now
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSubscription {
    pub subscription_type: SubscriptionTier,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub plan: Option<Plan>,
    pub features: PlanFeatures,
}

pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
    users: Arc<dyn UserRepository>,
    email: Arc<EmailService>,
    base_url: String,
}

impl SubscriptionService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRepository>,
        users: Arc<dyn UserRepository>,
        email: Arc<EmailService>,
        base_url: &str,
    ) -> Self {
        Self {
            subscriptions,
            payments,
            users,
            email,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn plans(&self) -> Vec<Plan> {
        SubscriptionTier::plans()
    }

    pub async fn create(
        &self,
        user: &User,
        input: CreateSubscriptionInput,
    ) -> ServiceResult<SubscriptionCreated> {
        let plan_id = input.plan_id.unwrap_or_default();
        let method = input.payment_method.unwrap_or_default();

        let paid_tiers: Vec<&str> = SubscriptionTier::ALL
            .iter()
            .filter(|t| t.is_paid())
            .map(|t| t.as_str())
            .collect();
        let mut v = Validator::new();
        v.one_of("planId", &plan_id, &paid_tiers)
            .one_of("paymentMethod", &method, &PaymentMethod::names());
        v.finish()?;

        let plan = plan_id
            .parse::<SubscriptionTier>()
            .ok()
            .and_then(|tier| tier.plan())
            .ok_or_else(|| ServiceError::invalid_field("planId", "Unknown plan"))?;
        let method: PaymentMethod = method
            .parse()
            .map_err(|_| ServiceError::invalid_field("paymentMethod", "Unknown payment method"))?;

        let subscription = Subscription::new(user.id.clone(), &plan, method);
        let subscription = self.subscriptions.create(&subscription).await?;
        let payment_url = format!("{}/payment?subscription={}", self.base_url, subscription.id);

        Ok(SubscriptionCreated {
            subscription,
            payment_url,
        })
    }

    pub async fn list(&self, user_id: &str) -> ServiceResult<Vec<Subscription>> {
        Ok(self.subscriptions.list_for_user(user_id).await?)
    }

    pub fn current(&self, user: &User) -> CurrentSubscription {
        let tier = user.effective_tier(Utc::now());
        CurrentSubscription {
            subscription_type: tier,
            expires_at: tier.is_paid().then_some(user.subscription_expires_at).flatten(),
            is_expired: user.subscription_type.is_paid() && !tier.is_paid(),
            plan: tier.plan(),
            features: tier.features(),
        }
    }

    /// Subscription owned by `user` (admins may address any)
    pub async fn get_owned(&self, user: &User, id: &str) -> ServiceResult<Subscription> {
        self.subscriptions
            .get_by_id(id)
            .await?
            .filter(|s| s.user_id == user.id || user.is_admin())
            .ok_or_else(|| ServiceError::not_found("SUBSCRIPTION_NOT_FOUND", "Subscription not found"))
    }

    /// Caller-initiated activation; students need a completed payment first
    pub async fn activate(&self, user: &User, id: &str) -> ServiceResult<Subscription> {
        let subscription = self.get_owned(user, id).await?;
        if subscription.status == SubscriptionStatus::Active {
            return Err(ServiceError::bad_request(
                "ALREADY_ACTIVE",
                "Subscription is already active",
            ));
        }
        if !user.is_admin() && !self.payments.has_completed_for_subscription(id).await? {
            return Err(ServiceError::payment_required(
                "PAYMENT_REQUIRED",
                "A completed payment is required to activate this subscription",
            ));
        }
        self.activate_paid(&subscription).await
    }

    /// Start the validity window and raise the owner's tier
    pub async fn activate_paid(&self, subscription: &Subscription) -> ServiceResult<Subscription> {
        let starts_at = Utc::now();
        let expires_at = plan_expiry(starts_at);
        self.subscriptions
            .activate(&subscription.id, starts_at, expires_at)
            .await?;
        self.users
            .set_subscription(&subscription.user_id, subscription.plan_id, Some(expires_at))
            .await?;

        tracing::info!(
            "Activated {} subscription {} for user {} until {}",
            subscription.plan_id,
            subscription.id,
            subscription.user_id,
            expires_at
        );

        if let Some(owner) = self.users.get_by_id(&subscription.user_id).await? {
            let plan_name = subscription
                .plan_id
                .plan()
                .map(|p| p.name)
                .unwrap_or_else(|| subscription.plan_id.to_string());
            self.email
                .send_subscription_activated(&owner, &plan_name, expires_at);
        }

        let mut activated = subscription.clone();
        activated.status = SubscriptionStatus::Active;
        activated.starts_at = Some(starts_at);
        activated.expires_at = Some(expires_at);
        Ok(activated)
    }

    pub async fn cancel(&self, user: &User, id: &str) -> ServiceResult<Subscription> {
        let mut subscription = self.get_owned(user, id).await?;
        if subscription.status != SubscriptionStatus::Pending {
            return Err(ServiceError::bad_request(
                "CANNOT_CANCEL",
                "Only pending subscriptions can be cancelled",
            ));
        }
        self.subscriptions
            .set_status(id, SubscriptionStatus::Cancelled)
            .await?;
        subscription.status = SubscriptionStatus::Cancelled;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxPaymentRepository, SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Payment, UserRole};
    use chrono::Duration;

    struct Fixture {
        service: SubscriptionService,
        users: Arc<dyn UserRepository>,
        payments: Arc<dyn PaymentRepository>,
        student: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let payments = SqlxPaymentRepository::boxed(pool.clone());
        let service = SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool),
            payments.clone(),
            users.clone(),
            Arc::new(EmailService::disabled("http://localhost:3000").unwrap()),
            "http://localhost:3000/",
        );
        let student = User::new("s@example.com".into(), "h".into(), "S".into());
        users.create(&student).await.unwrap();
        Fixture {
            service,
            users,
            payments,
            student,
        }
    }

    fn input(plan: &str, method: &str) -> CreateSubscriptionInput {
        CreateSubscriptionInput {
            plan_id: Some(plan.into()),
            payment_method: Some(method.into()),
        }
    }

    #[tokio::test]
    async fn test_create_validates_plan_and_method() {
        let f = setup().await;
        let err = f
            .service
            .create(&f.student, input("free", "paypal"))
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }

        let created = f
            .service
            .create(&f.student, input("Europe", "credit_card"))
            .await
            .unwrap();
        assert_eq!(created.subscription.amount, 50.0);
        assert_eq!(created.subscription.status, SubscriptionStatus::Pending);
        assert!(created
            .payment_url
            .starts_with("http://localhost:3000/payment?subscription="));
    }

    #[tokio::test]
    async fn test_activate_requires_payment() {
        let f = setup().await;
        let created = f
            .service
            .create(&f.student, input("global", "bank_transfer"))
            .await
            .unwrap();
        let id = created.subscription.id.clone();

        let err = f.service.activate(&f.student, &id).await.unwrap_err();
        assert_eq!(err.code(), "PAYMENT_REQUIRED");

        let payment = Payment::new(
            f.student.id.clone(),
            Some(id.clone()),
            100.0,
            "USD".into(),
            PaymentMethod::BankTransfer,
        );
        f.payments.create(&payment).await.unwrap();
        f.payments.complete(&payment.id, None).await.unwrap();

        let active = f.service.activate(&f.student, &id).await.unwrap();
        assert_eq!(active.status, SubscriptionStatus::Active);
        let user = f.users.get_by_id(&f.student.id).await.unwrap().unwrap();
        assert_eq!(user.subscription_type, SubscriptionTier::Global);
        let expires = user.subscription_expires_at.unwrap();
        assert!(expires > Utc::now() + Duration::days(729));

        let err = f.service.activate(&f.student, &id).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_ACTIVE");
        let err = f.service.cancel(&f.student, &id).await.unwrap_err();
        assert_eq!(err.code(), "CANNOT_CANCEL");
    }

    #[tokio::test]
    async fn test_admin_activation_and_ownership() {
        let f = setup().await;
        let created = f
            .service
            .create(&f.student, input("asia", "credit_card"))
            .await
            .unwrap();
        let id = created.subscription.id.clone();

        let other = User::new("o@example.com".into(), "h".into(), "O".into());
        f.users.create(&other).await.unwrap();
        let err = f.service.activate(&other, &id).await.unwrap_err();
        assert_eq!(err.code(), "SUBSCRIPTION_NOT_FOUND");

        let mut admin = User::new("a@example.com".into(), "h".into(), "A".into());
        admin.role = UserRole::Admin;
        f.users.create(&admin).await.unwrap();
        f.service.activate(&admin, &id).await.unwrap();

        let current = f
            .service
            .current(&f.users.get_by_id(&f.student.id).await.unwrap().unwrap());
        assert_eq!(current.subscription_type, SubscriptionTier::Asia);
        assert!(!current.is_expired);
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let f = setup().await;
        let created = f
            .service
            .create(&f.student, input("asia", "myxn_token"))
            .await
            .unwrap();
        let cancelled = f
            .service
            .cancel(&f.student, &created.subscription.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert_eq!(f.service.list(&f.student.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_current_reports_expiry() {
        let f = setup().await;
        let mut user = f.student.clone();
        user.subscription_type = SubscriptionTier::Europe;
        user.subscription_expires_at = Some(Utc::now() - Duration::days(1));

        let current = f.service.current(&user);
        assert_eq!(current.subscription_type, SubscriptionTier::Free);
        assert!(current.is_expired);
        assert!(current.expires_at.is_none());
        assert!(current.plan.is_none());
    }
}
