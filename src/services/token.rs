//! JWT issuing and verification (HS256)

use anyhow::Context;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{ServiceError, ServiceResult};
use crate::config::AuthConfig;
use crate::models::{SubscriptionTier, User, UserRole};

/// Token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub subscription_type: SubscriptionTier,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            ttl: Duration::days(config.jwt_expires_days),
        }
    }

    /// Sign a token for `user`, embedding the tier in effect right now
    pub fn issue(&self, user: &User) -> ServiceResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            subscription_type: user.effective_tier(now),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> ServiceResult<String> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .context("Failed to sign token")?;
        Ok(token)
    }

    /// Decode and check a token.
    ///
    /// An expired signature maps to `TOKEN_EXPIRED`, everything else to
    /// `INVALID_TOKEN`.
    pub fn verify(&self, token: &str) -> ServiceResult<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::unauthorized("TOKEN_EXPIRED", "Token has expired")
                }
                _ => ServiceError::unauthorized("INVALID_TOKEN", "Invalid token"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> TokenService {
        TokenService::new(&AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_expires_days: 7,
        })
    }

    fn user() -> User {
        User::new("ana@example.com".into(), "hash".into(), "Ana".into())
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = service("secret");
        let user = user();
        let token = tokens.issue(&user).unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.subscription_type, SubscriptionTier::Free);
        assert_eq!(claims.role, UserRole::Student);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_expired_token() {
        let tokens = service("secret");
        let now = Utc::now().timestamp();
        let token = tokens
            .sign(&Claims {
                sub: "u".into(),
                email: "e@example.com".into(),
                subscription_type: SubscriptionTier::Free,
                role: UserRole::Student,
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();
        assert_eq!(tokens.verify(&token).unwrap_err().code(), "TOKEN_EXPIRED");
    }

    #[test]
    fn test_wrong_secret_and_garbage() {
        let token = service("one").issue(&user()).unwrap();
        assert_eq!(
            service("two").verify(&token).unwrap_err().code(),
            "INVALID_TOKEN"
        );
        assert_eq!(
            service("one").verify("not.a.jwt").unwrap_err().code(),
            "INVALID_TOKEN"
        );
    }
}
