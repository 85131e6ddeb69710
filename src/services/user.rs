//! User service
//!
//! Registration, login, profile maintenance and password reset. Tokens are
//! stateless JWTs, so logout needs no server-side bookkeeping.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::email::EmailService;
use super::password::{generate_reset_token, hash_password, hash_reset_token, verify_password};
use super::rate_limiter::RateLimiter;
use super::token::TokenService;
use super::validation::{sanitize_opt, sanitize_text, Validator};
use super::{ServiceError, ServiceResult};
use crate::db::repositories::UserRepository;
use crate::models::{PlanFeatures, SubscriptionTier, User};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 100;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Partial profile update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub academic_level: Option<String>,
}

impl ProfileUpdate {
    fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone.is_none()
            && self.country.is_none()
            && self.date_of_birth.is_none()
            && self.address.is_none()
            && self.academic_level.is_none()
    }
}

/// User plus a freshly issued token
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Current user with the tier actually in force
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub effective_subscription: SubscriptionTier,
    pub features: PlanFeatures,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    limiter: Arc<RateLimiter>,
    email: Arc<EmailService>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        limiter: Arc<RateLimiter>,
        email: Arc<EmailService>,
    ) -> Self {
        Self {
            users,
            tokens,
            limiter,
            email,
        }
    }

    pub async fn register(&self, input: RegisterInput) -> ServiceResult<AuthSession> {
        let full_name = input.full_name.unwrap_or_default();
        let email = input.email.unwrap_or_default().trim().to_lowercase();
        let password = input.password.unwrap_or_default();

        let mut v = Validator::new();
        v.required("fullName", Some(&full_name))
            .max_len("fullName", &full_name, MAX_NAME_LEN)
            .email("email", &email)
            .min_len("password", &password, MIN_PASSWORD_LEN);
        v.finish()?;

        if self.users.get_by_email(&email).await?.is_some() {
            return Err(ServiceError::conflict(
                "EMAIL_EXISTS",
                "An account with this email already exists",
            ));
        }

        let mut user = User::new(email, hash_password(&password)?, sanitize_text(&full_name));
        user.phone = sanitize_opt(input.phone.as_deref());
        user.country = sanitize_opt(input.country.as_deref());
        user.profile_complete = user.calculate_profile_completion();

        let user = self.users.create(&user).await?;
        tracing::info!("Registered user {} ({})", user.id, user.email);
        self.email.send_welcome(&user);

        let token = self.tokens.issue(&user)?;
        Ok(AuthSession { user, token })
    }

    pub async fn login(&self, input: LoginInput) -> ServiceResult<AuthSession> {
        let email = input.email.unwrap_or_default().trim().to_lowercase();
        let password = input.password.unwrap_or_default();

        let mut v = Validator::new();
        v.required("email", Some(&email))
            .required("password", Some(&password));
        v.finish()?;

        if self.limiter.is_login_limited(&email).await {
            return Err(ServiceError::too_many_requests(
                "TOO_MANY_ATTEMPTS",
                "Too many failed login attempts, try again in 15 minutes",
            ));
        }

        let invalid = || ServiceError::unauthorized("INVALID_CREDENTIALS", "Invalid email or password");
        let found = self.users.get_by_email(&email).await?;
        let verified = match &found {
            Some(user) if user.is_active => verify_password(&password, &user.password_hash)?,
            _ => false,
        };
        let mut user = match found {
            Some(user) if verified => user,
            _ => {
                self.limiter.record_failed_login(&email).await;
                return Err(invalid());
            }
        };
        self.limiter.clear_login_attempts(&email).await;

        let now = Utc::now();
        if user.subscription_type.is_paid() && user.effective_tier(now) == SubscriptionTier::Free {
            tracing::info!(
                "Subscription '{}' of user {} expired, downgrading to free",
                user.subscription_type,
                user.id
            );
            user.subscription_type = SubscriptionTier::Free;
            user.subscription_expires_at = None;
        }
        user.last_login_at = Some(now);
        let user = self.users.update(&user).await?;

        let token = self.tokens.issue(&user)?;
        Ok(AuthSession { user, token })
    }

    pub async fn get_by_id(&self, id: &str) -> ServiceResult<Option<User>> {
        Ok(self.users.get_by_id(id).await?)
    }

    pub fn profile(&self, user: User) -> UserProfile {
        let tier = user.effective_tier(Utc::now());
        UserProfile {
            user,
            effective_subscription: tier,
            features: tier.features(),
        }
    }

    pub async fn update_profile(&self, user_id: &str, input: ProfileUpdate) -> ServiceResult<User> {
        if input.is_empty() {
            return Err(ServiceError::bad_request("NO_UPDATES", "No valid fields to update"));
        }

        let mut v = Validator::new();
        if let Some(name) = &input.full_name {
            v.required("fullName", Some(name))
                .max_len("fullName", name, MAX_NAME_LEN);
        }
        let date_of_birth = match input.date_of_birth.as_deref().map(str::trim) {
            None => None,
            Some("") => Some(None),
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(Some(date)),
                Err(_) => {
                    v.error("dateOfBirth", "Must be a date in YYYY-MM-DD format");
                    None
                }
            },
        };
        v.finish()?;

        let mut user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("USER_NOT_FOUND", "User not found"))?;

        if let Some(name) = &input.full_name {
            user.full_name = sanitize_text(name);
        }
        if let Some(phone) = &input.phone {
            user.phone = sanitize_opt(Some(phone));
        }
        if let Some(country) = &input.country {
            user.country = sanitize_opt(Some(country));
        }
        if let Some(address) = &input.address {
            user.address = sanitize_opt(Some(address));
        }
        if let Some(level) = &input.academic_level {
            user.academic_level = sanitize_opt(Some(level));
        }
        if let Some(date) = date_of_birth {
            user.date_of_birth = date;
        }
        user.profile_complete = user.calculate_profile_completion();

        Ok(self.users.update(&user).await?)
    }

    /// Start a password reset; silent for unknown emails
    pub async fn forgot_password(&self, email: &str) -> ServiceResult<()> {
        let email = email.trim().to_lowercase();
        let Some(mut user) = self.users.get_by_email(&email).await? else {
            return Ok(());
        };

        let (token, digest) = generate_reset_token();
        user.reset_token_hash = Some(digest);
        user.reset_token_expires_at = Some(Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS));
        let user = self.users.update(&user).await?;
        self.email.send_password_reset(&user, &token);
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> ServiceResult<()> {
        let mut v = Validator::new();
        v.required("token", Some(token))
            .min_len("password", password, MIN_PASSWORD_LEN);
        v.finish()?;

        let invalid = || ServiceError::bad_request("INVALID_TOKEN", "Invalid or expired reset token");
        let mut user = self
            .users
            .get_by_reset_token(&hash_reset_token(token.trim()))
            .await?
            .ok_or_else(invalid)?;
        if user.reset_token_expires_at.map_or(true, |at| at < Utc::now()) {
            return Err(invalid());
        }

        user.password_hash = hash_password(password)?;
        user.reset_token_hash = None;
        user.reset_token_expires_at = None;
        self.users.update(&user).await?;
        tracing::info!("Password reset for user {}", user.id);
        Ok(())
    }

    /// New token reflecting the current stored user
    pub fn refresh(&self, user: &User) -> ServiceResult<String> {
        self.tokens.issue(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, RateLimitConfig};
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (UserService, Arc<dyn UserRepository>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool);
        let service = UserService::new(
            users.clone(),
            Arc::new(TokenService::new(&AuthConfig::default())),
            Arc::new(RateLimiter::new(&RateLimitConfig::default())),
            Arc::new(EmailService::disabled("http://localhost:3000").unwrap()),
        );
        (service, users)
    }

    fn register_input(email: &str) -> RegisterInput {
        RegisterInput {
            full_name: Some("Ana <Lima>".into()),
            email: Some(email.into()),
            password: Some("supersecret".into()),
            phone: None,
            country: Some("Brazil".into()),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (service, _) = setup().await;
        let session = service.register(register_input("Ana@Example.com")).await.unwrap();
        assert_eq!(session.user.email, "ana@example.com");
        assert_eq!(session.user.full_name, "Ana &lt;Lima&gt;");
        assert_eq!(session.user.profile_complete, 43);
        assert!(!session.token.is_empty());

        let session = service
            .login(LoginInput {
                email: Some("ANA@example.com".into()),
                password: Some("supersecret".into()),
            })
            .await
            .unwrap();
        assert!(session.user.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_register_validation_and_duplicate() {
        let (service, _) = setup().await;
        let err = service
            .register(RegisterInput {
                email: Some("bad".into()),
                password: Some("short".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected {:?}", other),
        }

        service.register(register_input("dup@example.com")).await.unwrap();
        let err = service
            .register(register_input("DUP@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EMAIL_EXISTS");
    }

    #[tokio::test]
    async fn test_login_lockout() {
        let (service, _) = setup().await;
        service.register(register_input("lock@example.com")).await.unwrap();
        let attempt = |password: &str| LoginInput {
            email: Some("lock@example.com".into()),
            password: Some(password.into()),
        };

        for _ in 0..5 {
            let err = service.login(attempt("wrong-password")).await.unwrap_err();
            assert_eq!(err.code(), "INVALID_CREDENTIALS");
        }
        let err = service.login(attempt("supersecret")).await.unwrap_err();
        assert_eq!(err.code(), "TOO_MANY_ATTEMPTS");
    }

    #[tokio::test]
    async fn test_login_downgrades_expired_plan() {
        let (service, users) = setup().await;
        let session = service.register(register_input("old@example.com")).await.unwrap();
        users
            .set_subscription(
                &session.user.id,
                SubscriptionTier::Europe,
                Some(Utc::now() - Duration::days(1)),
            )
            .await
            .unwrap();

        let session = service
            .login(LoginInput {
                email: Some("old@example.com".into()),
                password: Some("supersecret".into()),
            })
            .await
            .unwrap();
        assert_eq!(session.user.subscription_type, SubscriptionTier::Free);
        let stored = users.get_by_id(&session.user.id).await.unwrap().unwrap();
        assert_eq!(stored.subscription_type, SubscriptionTier::Free);
        assert!(stored.subscription_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (service, _) = setup().await;
        let session = service.register(register_input("p@example.com")).await.unwrap();

        let err = service
            .update_profile(&session.user.id, ProfileUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NO_UPDATES");

        let err = service
            .update_profile(
                &session.user.id,
                ProfileUpdate {
                    date_of_birth: Some("31/12/2000".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let user = service
            .update_profile(
                &session.user.id,
                ProfileUpdate {
                    phone: Some("+55 11 5555".into()),
                    address: Some("Rua A, 1".into()),
                    academic_level: Some("bachelor".into()),
                    date_of_birth: Some("2000-12-31".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(user.profile_complete, 100);
        assert_eq!(user.date_of_birth, NaiveDate::from_ymd_opt(2000, 12, 31));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (service, users) = setup().await;
        let session = service.register(register_input("r@example.com")).await.unwrap();

        service.forgot_password("nobody@example.com").await.unwrap();
        service.forgot_password("R@example.com").await.unwrap();
        let stored = users.get_by_id(&session.user.id).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_some());

        let err = service
            .reset_password("not-the-token", "newpassword")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TOKEN");

        // The emailed token is not observable here, so plant a known one.
        let mut user = stored;
        user.reset_token_hash = Some(hash_reset_token("known-token"));
        users.update(&user).await.unwrap();

        service.reset_password("known-token", "newpassword").await.unwrap();
        let stored = users.get_by_id(&user.id).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_none());
        assert!(verify_password("newpassword", &stored.password_hash).unwrap());

        let err = service
            .reset_password("known-token", "anotherpass")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TOKEN");
    }
}
