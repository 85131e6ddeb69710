//! Subscription tiers, plan catalogue and the tier-to-feature table
//!
//! Access rules throughout the API are derived from [`SubscriptionTier`]:
//! its numeric level orders tiers for gating, and [`SubscriptionTier::features`]
//! is the single source for limits such as the number of applications.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Paid plans stay valid for this many years after activation
pub const PLAN_VALIDITY_YEARS: u32 = 2;

string_enum! {
    /// Subscription tier held by a user
    pub enum SubscriptionTier {
        Free => "free",
        Asia => "asia",
        Europe => "europe",
        Global => "global",
    }
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Free
    }
}

impl SubscriptionTier {
    /// Gating level: free 0, asia 1, europe 2, global 3
    pub fn level(&self) -> u8 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Asia => 1,
            SubscriptionTier::Europe => 2,
            SubscriptionTier::Global => 3,
        }
    }

    pub fn is_paid(&self) -> bool {
        *self != SubscriptionTier::Free
    }

    /// Whether this tier satisfies a minimum tier requirement
    pub fn satisfies(&self, required: SubscriptionTier) -> bool {
        self.level() >= required.level()
    }

    pub fn features(&self) -> PlanFeatures {
        match self {
            SubscriptionTier::Free => PlanFeatures {
                applications: ApplicationLimit::Limited(3),
                universities: UniversityAccess::Limited,
                regions: Vec::new(),
                ai_support: AiSupport::Basic,
                auto_scholarship_match: false,
                premium_support: false,
                uk_bonus: false,
            },
            SubscriptionTier::Asia => PlanFeatures {
                applications: ApplicationLimit::Limited(5),
                universities: UniversityAccess::Full,
                regions: vec!["Asia"],
                ai_support: AiSupport::Full,
                auto_scholarship_match: false,
                premium_support: false,
                uk_bonus: false,
            },
            SubscriptionTier::Europe => PlanFeatures {
                applications: ApplicationLimit::Limited(5),
                universities: UniversityAccess::Full,
                regions: vec!["Europe"],
                ai_support: AiSupport::Full,
                auto_scholarship_match: false,
                premium_support: false,
                uk_bonus: false,
            },
            SubscriptionTier::Global => PlanFeatures {
                applications: ApplicationLimit::Unlimited,
                universities: UniversityAccess::Full,
                regions: vec!["Asia", "Europe", "North America", "UK", "Australia"],
                ai_support: AiSupport::Premium,
                auto_scholarship_match: true,
                premium_support: true,
                uk_bonus: true,
            },
        }
    }

    /// The purchasable plan for a paid tier
    pub fn plan(&self) -> Option<Plan> {
        let (name, price, popular, features): (&str, f64, bool, &[&str]) = match self {
            SubscriptionTier::Free => return None,
            SubscriptionTier::Asia => (
                "Asia Plan",
                25.0,
                false,
                &[
                    "Apply to 5 universities",
                    "Full access to Asian universities",
                    "AI application assistant",
                    "Scholarship search",
                ],
            ),
            SubscriptionTier::Europe => (
                "Europe Plan",
                50.0,
                false,
                &[
                    "Apply to 5 universities",
                    "Full access to European universities",
                    "AI application assistant",
                    "Scholarship search",
                ],
            ),
            SubscriptionTier::Global => (
                "Global Plan",
                100.0,
                true,
                &[
                    "Unlimited applications",
                    "Universities in every region",
                    "Premium AI assistant",
                    "Automatic scholarship matching",
                    "Priority support",
                    "UK application bonus",
                ],
            ),
        };

        Some(Plan {
            id: *self,
            name: name.to_string(),
            price,
            currency: "USD".to_string(),
            validity_years: PLAN_VALIDITY_YEARS,
            popular,
            features: features.iter().map(|f| f.to_string()).collect(),
        })
    }

    /// All purchasable plans in ascending price
    pub fn plans() -> Vec<Plan> {
        Self::ALL.iter().filter_map(|tier| tier.plan()).collect()
    }

    /// The tier a user effectively holds at `now`: paid tiers lapse to free
    /// once their expiry has passed.
    pub fn effective(self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match expires_at {
            Some(expiry) if self.is_paid() && expiry <= now => SubscriptionTier::Free,
            _ => self,
        }
    }
}

impl PartialOrd for SubscriptionTier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubscriptionTier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

/// Expiry for a plan activated at `from`
pub fn plan_expiry(from: DateTime<Utc>) -> DateTime<Utc> {
    from.checked_add_months(Months::new(12 * PLAN_VALIDITY_YEARS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// How many applications a tier may submit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationLimit {
    Limited(u32),
    Unlimited,
}

impl ApplicationLimit {
    /// Whether one more application fits given `used` so far
    pub fn allows(&self, used: i64) -> bool {
        match self {
            ApplicationLimit::Limited(max) => used < i64::from(*max),
            ApplicationLimit::Unlimited => true,
        }
    }

    /// Remaining applications, `None` meaning unlimited
    pub fn remaining(&self, used: i64) -> Option<i64> {
        match self {
            ApplicationLimit::Limited(max) => Some((i64::from(*max) - used).max(0)),
            ApplicationLimit::Unlimited => None,
        }
    }
}

impl Serialize for ApplicationLimit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ApplicationLimit::Limited(max) => serializer.serialize_u32(*max),
            ApplicationLimit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

string_enum! {
    pub enum UniversityAccess {
        Limited => "limited",
        Full => "full",
    }
}

string_enum! {
    /// Depth of the chat assistant's answers
    pub enum AiSupport {
        Basic => "basic",
        Full => "full",
        Premium => "premium",
    }
}

/// Feature set unlocked by a tier
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFeatures {
    pub applications: ApplicationLimit,
    pub universities: UniversityAccess,
    pub regions: Vec<&'static str>,
    pub ai_support: AiSupport,
    pub auto_scholarship_match: bool,
    pub premium_support: bool,
    pub uk_bonus: bool,
}

/// A purchasable plan from the catalogue
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: SubscriptionTier,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub validity_years: u32,
    pub popular: bool,
    pub features: Vec<String>,
}

string_enum! {
    pub enum SubscriptionStatus {
        Pending => "pending",
        Active => "active",
        Expired => "expired",
        Cancelled => "cancelled",
    }
}

string_enum! {
    pub enum PaymentMethod {
        MyxnToken => "myxn_token",
        CreditCard => "credit_card",
        BankTransfer => "bank_transfer",
    }
}

impl PaymentMethod {
    /// Crypto payments are settled on-chain and get a wallet QR payload
    pub fn is_crypto(&self) -> bool {
        *self == PaymentMethod::MyxnToken
    }
}

/// A purchased (or pending) plan
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub plan_id: SubscriptionTier,
    #[sqlx(try_from = "String")]
    pub status: SubscriptionStatus,
    pub amount: f64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Pending purchase of `plan` at its catalogue price
    pub fn new(user_id: String, plan: &Plan, payment_method: PaymentMethod) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            plan_id: plan.id,
            status: SubscriptionStatus::Pending,
            amount: plan.price,
            currency: plan.currency.clone(),
            payment_method,
            starts_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
