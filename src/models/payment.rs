use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PaymentMethod;

string_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub subscription_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub transaction_id: String,
    /// Gateway payload, stored as JSON text
    #[serde(skip)]
    pub payment_data: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        user_id: String,
        subscription_id: Option<String>,
        amount: f64,
        currency: String,
        payment_method: PaymentMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            subscription_id,
            amount,
            currency,
            payment_method,
            status: PaymentStatus::Pending,
            transaction_id: format!("TXN-{}", uuid::Uuid::new_v4().simple()),
            payment_data: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Payment history row with the plan it paid for
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWithPlan {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub payment: Payment,
    /// Null when the subscription has been removed
    pub plan_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_payment_transaction_id() {
        let payment = Payment::new(
            "user".into(),
            None,
            25.0,
            "USD".into(),
            PaymentMethod::CreditCard,
        );
        assert!(payment.transaction_id.starts_with("TXN-"));
        assert_eq!(payment.transaction_id.len(), 4 + 32);
        assert_eq!(payment.status, PaymentStatus::Pending);
    }
}
