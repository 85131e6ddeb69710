//! Payment service
//!
//! Records payments against pending subscriptions and verifies them. There
//! is no gateway integration: verification is an explicit API call, and a
//! verified payment activates its subscription.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::subscription::SubscriptionService;
use super::validation::{PageMeta, Pagination, Validator};
use super::{ServiceError, ServiceResult};
use crate::config::PaymentConfig;
use crate::db::repositories::{PaymentRepository, SubscriptionRepository};
use crate::models::{
    Payment, PaymentMethod, PaymentStatus, PaymentWithPlan, Subscription, SubscriptionStatus,
    User,
};

/// Tolerance when comparing a client-supplied amount with the plan price
const AMOUNT_EPSILON: f64 = 0.005;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentInput {
    pub subscription_id: Option<String>,
    pub payment_method: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentInput {
    pub payment_id: Option<String>,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCreated {
    pub payment: Payment,
    pub payment_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub verified: bool,
    pub already_verified: bool,
    pub payment: Payment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    subscription_service: Arc<SubscriptionService>,
    wallet_address: String,
    base_url: String,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        subscription_service: Arc<SubscriptionService>,
        config: &PaymentConfig,
        base_url: &str,
    ) -> Self {
        Self {
            payments,
            subscriptions,
            subscription_service,
            wallet_address: config.wallet_address.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn create(&self, user: &User, input: CreatePaymentInput) -> ServiceResult<PaymentCreated> {
        let subscription_id = input.subscription_id.unwrap_or_default();
        let method = input.payment_method.unwrap_or_default();

        let mut v = Validator::new();
        v.required("subscriptionId", Some(&subscription_id))
            .one_of("paymentMethod", &method, &PaymentMethod::names());
        if let Some(amount) = input.amount {
            if !amount.is_finite() || amount < 0.0 {
                v.error("amount", "Must be a non-negative number");
            }
        }
        v.finish()?;
        let method: PaymentMethod = method
            .parse()
            .map_err(|_| ServiceError::invalid_field("paymentMethod", "Unknown payment method"))?;

        let subscription = self
            .subscriptions
            .get_by_id(subscription_id.trim())
            .await?
            .filter(|s| s.user_id == user.id)
            .ok_or_else(|| ServiceError::not_found("SUBSCRIPTION_NOT_FOUND", "Subscription not found"))?;

        match subscription.status {
            SubscriptionStatus::Pending => {}
            SubscriptionStatus::Active => {
                return Err(ServiceError::bad_request(
                    "ALREADY_PAID",
                    "Subscription is already active",
                ))
            }
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                return Err(not_payable(&subscription))
            }
        }
        if let Some(amount) = input.amount {
            if (amount - subscription.amount).abs() > AMOUNT_EPSILON {
                return Err(ServiceError::bad_request(
                    "AMOUNT_MISMATCH",
                    format!(
                        "Amount must equal the plan price of {:.2} {}",
                        subscription.amount, subscription.currency
                    ),
                ));
            }
        }

        let mut payment = Payment::new(
            user.id.clone(),
            Some(subscription.id.clone()),
            subscription.amount,
            subscription.currency.clone(),
            method,
        );

        let (wallet_address, qr_code, channel) = if method.is_crypto() {
            let qr = format!(
                "{}?amount={:.2}&currency={}&reference={}",
                self.wallet_address, payment.amount, payment.currency, payment.transaction_id
            );
            (Some(self.wallet_address.clone()), Some(qr), "crypto")
        } else {
            (None, None, "card")
        };
        payment.payment_data = Some(
            json!({
                "plan": subscription.plan_id,
                "channel": channel,
                "walletAddress": wallet_address,
            })
            .to_string(),
        );

        let payment = self.payments.create(&payment).await?;
        let payment_url = format!("{}/payment/{}/{}", self.base_url, channel, payment.id);

        Ok(PaymentCreated {
            payment,
            payment_url,
            wallet_address,
            qr_code,
        })
    }

    /// Complete a payment and activate its subscription.
    ///
    /// Repeating the call on a completed payment is a no-op.
    pub async fn verify(&self, user: &User, input: VerifyPaymentInput) -> ServiceResult<VerifyOutcome> {
        let payment_id = input.payment_id.unwrap_or_default();
        let mut v = Validator::new();
        v.required("paymentId", Some(&payment_id));
        v.finish()?;

        let payment = self
            .payments
            .get_by_id(payment_id.trim())
            .await?
            .filter(|p| p.user_id == user.id || user.is_admin())
            .ok_or_else(|| ServiceError::not_found("PAYMENT_NOT_FOUND", "Payment not found"))?;

        match payment.status {
            PaymentStatus::Completed => {
                return Ok(VerifyOutcome {
                    verified: true,
                    already_verified: true,
                    payment,
                    subscription: None,
                })
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                return Err(ServiceError::bad_request(
                    "PAYMENT_NOT_VERIFIABLE",
                    format!("Payment is {}", payment.status),
                ))
            }
            PaymentStatus::Pending => {}
        }

        let subscription = match &payment.subscription_id {
            Some(id) => self.subscriptions.get_by_id(id).await?,
            None => None,
        };
        if let Some(sub) = &subscription {
            if matches!(
                sub.status,
                SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
            ) {
                return Err(not_payable(sub));
            }
        }

        let data = input
            .transaction_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|hash| json!({ "transactionHash": hash }).to_string());
        self.payments.complete(&payment.id, data.as_deref()).await?;
        tracing::info!(
            "Payment {} ({}) completed for user {}",
            payment.id,
            payment.transaction_id,
            payment.user_id
        );

        let subscription = match subscription {
            Some(sub) if sub.status == SubscriptionStatus::Pending => {
                Some(self.subscription_service.activate_paid(&sub).await?)
            }
            other => other,
        };

        let payment = self
            .payments
            .get_by_id(&payment.id)
            .await?
            .ok_or_else(|| ServiceError::not_found("PAYMENT_NOT_FOUND", "Payment not found"))?;
        Ok(VerifyOutcome {
            verified: true,
            already_verified: false,
            payment,
            subscription,
        })
    }

    pub async fn history(
        &self,
        user_id: &str,
        page: Pagination,
    ) -> ServiceResult<(Vec<PaymentWithPlan>, PageMeta)> {
        let items = self
            .payments
            .history(user_id, page.limit, page.offset())
            .await?;
        let total = self.payments.count_for_user(user_id).await?;
        Ok((items, page.meta(total)))
    }
}

fn not_payable(subscription: &Subscription) -> ServiceError {
    ServiceError::bad_request(
        "SUBSCRIPTION_NOT_PAYABLE",
        format!("Subscription is {}", subscription.status),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxPaymentRepository, SqlxSubscriptionRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{SubscriptionTier, UserRole};
    use crate::services::EmailService;

    struct Fixture {
        service: PaymentService,
        subscriptions: Arc<dyn SubscriptionRepository>,
        users: Arc<dyn UserRepository>,
        student: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let payments = SqlxPaymentRepository::boxed(pool.clone());
        let subscriptions = SqlxSubscriptionRepository::boxed(pool);
        let subscription_service = Arc::new(SubscriptionService::new(
            subscriptions.clone(),
            payments.clone(),
            users.clone(),
            Arc::new(EmailService::disabled("http://localhost:3000").unwrap()),
            "http://localhost:3000",
        ));
        let service = PaymentService::new(
            payments,
            subscriptions.clone(),
            subscription_service,
            &PaymentConfig::default(),
            "http://localhost:3000",
        );
        let student = User::new("pay@example.com".into(), "h".into(), "Pay".into());
        users.create(&student).await.unwrap();
        Fixture {
            service,
            subscriptions,
            users,
            student,
        }
    }

    async fn pending(f: &Fixture, tier: SubscriptionTier) -> Subscription {
        let plan = tier.plan().unwrap();
        let sub = Subscription::new(f.student.id.clone(), &plan, PaymentMethod::CreditCard);
        f.subscriptions.create(&sub).await.unwrap()
    }

    fn create_input(subscription_id: &str, method: &str, amount: Option<f64>) -> CreatePaymentInput {
        CreatePaymentInput {
            subscription_id: Some(subscription_id.into()),
            payment_method: Some(method.into()),
            amount,
        }
    }

    #[tokio::test]
    async fn test_create_checks_amount_and_ownership() {
        let f = setup().await;
        let sub = pending(&f, SubscriptionTier::Europe).await;

        let err = f
            .service
            .create(&f.student, create_input(&sub.id, "credit_card", Some(10.0)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AMOUNT_MISMATCH");

        let stranger = User::new("x@example.com".into(), "h".into(), "X".into());
        let err = f
            .service
            .create(&stranger, create_input(&sub.id, "credit_card", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SUBSCRIPTION_NOT_FOUND");

        let created = f
            .service
            .create(&f.student, create_input(&sub.id, "credit_card", Some(50.0)))
            .await
            .unwrap();
        assert!(created.payment.transaction_id.starts_with("TXN-"));
        assert!(created.qr_code.is_none());
        assert!(created.payment_url.contains("/payment/card/"));
    }

    #[tokio::test]
    async fn test_crypto_payment_has_wallet() {
        let f = setup().await;
        let sub = pending(&f, SubscriptionTier::Asia).await;
        let created = f
            .service
            .create(&f.student, create_input(&sub.id, "myxn_token", None))
            .await
            .unwrap();
        assert_eq!(
            created.wallet_address.as_deref(),
            Some(PaymentConfig::default().wallet_address.as_str())
        );
        let qr = created.qr_code.unwrap();
        assert!(qr.contains("amount=25.00"));
        assert!(qr.contains(&created.payment.transaction_id));
    }

    #[tokio::test]
    async fn test_verify_activates_and_is_idempotent() {
        let f = setup().await;
        let sub = pending(&f, SubscriptionTier::Global).await;
        let created = f
            .service
            .create(&f.student, create_input(&sub.id, "credit_card", None))
            .await
            .unwrap();
        let input = || VerifyPaymentInput {
            payment_id: Some(created.payment.id.clone()),
            transaction_hash: Some("0xabc".into()),
        };

        let outcome = f.service.verify(&f.student, input()).await.unwrap();
        assert!(!outcome.already_verified);
        assert_eq!(outcome.payment.status, PaymentStatus::Completed);
        assert_eq!(
            outcome.subscription.unwrap().status,
            SubscriptionStatus::Active
        );
        let user = f.users.get_by_id(&f.student.id).await.unwrap().unwrap();
        assert_eq!(user.subscription_type, SubscriptionTier::Global);

        let again = f.service.verify(&f.student, input()).await.unwrap();
        assert!(again.already_verified);

        let err = f
            .service
            .create(&f.student, create_input(&sub.id, "credit_card", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_PAID");

        let (history, meta) = f
            .service
            .history(&f.student.id, Pagination::default())
            .await
            .unwrap();
        assert_eq!(meta.total, 1);
        assert_eq!(history[0].plan_id.as_deref(), Some("global"));
    }

    #[tokio::test]
    async fn test_cancelled_subscription_cannot_be_paid() {
        let f = setup().await;
        let sub = pending(&f, SubscriptionTier::Europe).await;
        let created = f
            .service
            .create(&f.student, create_input(&sub.id, "credit_card", None))
            .await
            .unwrap();
        f.subscriptions
            .set_status(&sub.id, SubscriptionStatus::Cancelled)
            .await
            .unwrap();

        let err = f
            .service
            .create(&f.student, create_input(&sub.id, "credit_card", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SUBSCRIPTION_NOT_PAYABLE");

        let input = VerifyPaymentInput {
            payment_id: Some(created.payment.id.clone()),
            transaction_hash: None,
        };
        let err = f.service.verify(&f.student, input).await.unwrap_err();
        assert_eq!(err.code(), "SUBSCRIPTION_NOT_PAYABLE");

        let sub = f.subscriptions.get_by_id(&sub.id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        let user = f.users.get_by_id(&f.student.id).await.unwrap().unwrap();
        assert_eq!(user.subscription_type, SubscriptionTier::Free);
    }

    #[tokio::test]
    async fn test_verify_restricted_to_owner_or_admin() {
        let f = setup().await;
        let sub = pending(&f, SubscriptionTier::Asia).await;
        let created = f
            .service
            .create(&f.student, create_input(&sub.id, "bank_transfer", None))
            .await
            .unwrap();
        let input = || VerifyPaymentInput {
            payment_id: Some(created.payment.id.clone()),
            transaction_hash: None,
        };

        let stranger = User::new("s@example.com".into(), "h".into(), "S".into());
        let err = f.service.verify(&stranger, input()).await.unwrap_err();
        assert_eq!(err.code(), "PAYMENT_NOT_FOUND");

        let mut admin = User::new("admin@example.com".into(), "h".into(), "A".into());
        admin.role = UserRole::Admin;
        assert!(f.service.verify(&admin, input()).await.unwrap().verified);
    }
}
