use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::SubscriptionTier;

string_enum! {
    /// Account role
    pub enum UserRole {
        Student => "student",
        Admin => "admin",
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Student
    }
}

/// Fields counted by the profile completion score
pub const PROFILE_FIELDS: [&str; 7] = [
    "full_name",
    "email",
    "country",
    "academic_level",
    "phone",
    "address",
    "date_of_birth",
];

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub academic_level: Option<String>,
    pub profile_complete: i32,
    #[sqlx(try_from = "String")]
    pub subscription_type: SubscriptionTier,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub free_applications_used: i32,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    pub is_active: bool,
    #[serde(skip)]
    pub reset_token_hash: Option<String>,
    #[serde(skip)]
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new free-tier student
    pub fn new(email: String, password_hash: String, full_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash,
            full_name,
            phone: None,
            country: None,
            date_of_birth: None,
            address: None,
            academic_level: None,
            profile_complete: 0,
            subscription_type: SubscriptionTier::Free,
            subscription_expires_at: None,
            free_applications_used: 0,
            role: UserRole::Student,
            is_active: true,
            reset_token_hash: None,
            reset_token_expires_at: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Tier in force at `now`, after expiry
    pub fn effective_tier(&self, now: DateTime<Utc>) -> SubscriptionTier {
        self.subscription_type
            .effective(self.subscription_expires_at, now)
    }

    /// Percentage of [`PROFILE_FIELDS`] that are filled in
    pub fn calculate_profile_completion(&self) -> i32 {
        fn filled(value: Option<&str>) -> bool {
            value.map(|v| !v.trim().is_empty()).unwrap_or(false)
        }

        let checks = [
            filled(Some(&self.full_name)),
            filled(Some(&self.email)),
            filled(self.country.as_deref()),
            filled(self.academic_level.as_deref()),
            filled(self.phone.as_deref()),
            filled(self.address.as_deref()),
            self.date_of_birth.is_some(),
        ];
        let count = checks.iter().filter(|c| **c).count();
        ((count as f64 / PROFILE_FIELDS.len() as f64) * 100.0).round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> User {
        User::new(
            "ada@example.com".to_string(),
            "hash".to_string(),
            "Ada Lovelace".to_string(),
        )
    }

    #[test]
    fn test_new_user_defaults() {
        let user = sample();
        assert_eq!(user.role, UserRole::Student);
        assert_eq!(user.subscription_type, SubscriptionTier::Free);
        assert!(user.is_active);
        assert!(!user.is_admin());
        assert!(uuid::Uuid::parse_str(&user.id).is_ok());
    }

    #[test]
    fn test_profile_completion() {
        let mut user = sample();
        assert_eq!(user.calculate_profile_completion(), 29);

        user.country = Some("Kenya".to_string());
        user.phone = Some("  ".to_string());
        assert_eq!(user.calculate_profile_completion(), 43);

        user.phone = Some("+254700000000".to_string());
        user.academic_level = Some("bachelor".to_string());
        user.address = Some("Nairobi".to_string());
        user.date_of_birth = NaiveDate::from_ymd_opt(2001, 5, 4);
        assert_eq!(user.calculate_profile_completion(), 100);
    }

    #[test]
    fn test_effective_tier() {
        let now = Utc::now();
        let mut user = sample();
        user.subscription_type = SubscriptionTier::Global;
        user.subscription_expires_at = Some(now - Duration::seconds(1));
        assert_eq!(user.effective_tier(now), SubscriptionTier::Free);

        user.subscription_expires_at = Some(now + Duration::days(30));
        assert_eq!(user.effective_tier(now), SubscriptionTier::Global);
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut user = sample();
        user.reset_token_hash = Some("abc".to_string());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("resetTokenHash").is_none());
        assert_eq!(json["fullName"], "Ada Lovelace");
        assert_eq!(json["subscriptionType"], "free");
    }
}
