//! In-memory rate limiting
//!
//! Two independent limits:
//! - failed logins per email (5 attempts per 15 minutes)
//! - API requests per client IP (fixed window from `rate_limit` config)

use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

const LOGIN_MAX_ATTEMPTS: usize = 5;
const LOGIN_WINDOW_MINUTES: i64 = 15;

/// Request counter for one client inside the current window
#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

pub struct RateLimiter {
    /// Failed login attempts by lowercased email
    login_attempts: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
    /// Fixed windows by client IP
    ip_windows: Arc<RwLock<HashMap<IpAddr, Window>>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            login_attempts: Arc::new(RwLock::new(HashMap::new())),
            ip_windows: Arc::new(RwLock::new(HashMap::new())),
            window: Duration::seconds(config.window_secs as i64),
            max_requests: config.max_requests,
        }
    }

    /// Whether `email` has used up its failed login attempts
    pub async fn is_login_limited(&self, email: &str) -> bool {
        let mut attempts = self.login_attempts.write().await;
        let cutoff = Utc::now() - Duration::minutes(LOGIN_WINDOW_MINUTES);

        let email_attempts = attempts.entry(email.to_lowercase()).or_default();
        email_attempts.retain(|time| *time > cutoff);
        email_attempts.len() >= LOGIN_MAX_ATTEMPTS
    }

    pub async fn record_failed_login(&self, email: &str) {
        let mut attempts = self.login_attempts.write().await;
        attempts
            .entry(email.to_lowercase())
            .or_default()
            .push(Utc::now());
    }

    /// Forget failed attempts after a successful login
    pub async fn clear_login_attempts(&self, email: &str) {
        self.login_attempts
            .write()
            .await
            .remove(&email.to_lowercase());
    }

    /// Count a request from `ip`; returns false once the window is exhausted
    pub async fn check_request(&self, ip: IpAddr) -> bool {
        let now = Utc::now();
        let mut windows = self.ip_windows.write().await;
        let window = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        if now - window.started >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let login_cutoff = now - Duration::minutes(LOGIN_WINDOW_MINUTES);

        {
            let mut attempts = self.login_attempts.write().await;
            attempts.retain(|_, times| {
                times.retain(|time| *time > login_cutoff);
                !times.is_empty()
            });
        }

        {
            let window = self.window;
            let mut windows = self.ip_windows.write().await;
            windows.retain(|_, w| now - w.started < window);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_login_limit() {
        let limiter = RateLimiter::default();

        for _ in 0..4 {
            assert!(!limiter.is_login_limited("a@example.com").await);
            limiter.record_failed_login("a@example.com").await;
        }
        limiter.record_failed_login("A@Example.com").await;
        assert!(limiter.is_login_limited("a@example.com").await);

        limiter.clear_login_attempts("a@example.com").await;
        assert!(!limiter.is_login_limited("a@example.com").await);
    }

    #[tokio::test]
    async fn test_request_window() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            window_secs: 60,
            max_requests: 3,
        });
        let ip = IpAddr::from_str("10.0.0.1").unwrap();
        let other = IpAddr::from_str("10.0.0.2").unwrap();

        for _ in 0..3 {
            assert!(limiter.check_request(ip).await);
        }
        assert!(!limiter.check_request(ip).await);
        assert!(limiter.check_request(other).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_live_windows() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            window_secs: 60,
            max_requests: 1,
        });
        let ip = IpAddr::from_str("10.0.0.3").unwrap();
        assert!(limiter.check_request(ip).await);
        limiter.cleanup().await;
        assert!(!limiter.check_request(ip).await);
    }
}
