//! Transactional email
//!
//! Message bodies are tera templates registered at startup. Without an SMTP
//! host the service only logs what it would have sent.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};

use crate::config::MailConfig;
use crate::models::User;

const TEMPLATES: &[(&str, &str, &str)] = &[
    (
        "welcome",
        "Welcome to Unibridge, {{ name }}",
        "Hi {{ name }},\n\n\
         Your Unibridge account is ready. Browse universities and start your first \
         application at {{ base_url }}.\n\n\
         Free accounts can submit up to 3 applications.\n\n\
         The Unibridge Team\n",
    ),
    (
        "password_reset",
        "Reset your Unibridge password",
        "Hi {{ name }},\n\n\
         Use the link below to choose a new password. It is valid for one hour.\n\n\
         {{ reset_url }}\n\n\
         If you did not ask for this, you can ignore this email.\n",
    ),
    (
        "application_submitted",
        "Application submitted: {{ university }}",
        "Hi {{ name }},\n\n\
         Your application to {{ university }}{% if program %} ({{ program }}){% endif %} \
         has been received and is pending review.\n\n\
         Track its status at {{ base_url }}/applications.\n",
    ),
    (
        "subscription_activated",
        "Your {{ plan }} is active",
        "Hi {{ name }},\n\n\
         Your {{ plan }} is now active and valid until {{ expires }}.\n\n\
         The Unibridge Team\n",
    ),
];

pub struct EmailService {
    from: String,
    base_url: String,
    templates: Tera,
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    pub fn new(config: &MailConfig, base_url: &str) -> Result<Self> {
        let mut templates = Tera::default();
        for (name, subject, body) in TEMPLATES {
            templates
                .add_raw_template(&format!("{}.subject", name), subject)
                .with_context(|| format!("Invalid subject template '{}'", name))?;
            templates
                .add_raw_template(&format!("{}.txt", name), body)
                .with_context(|| format!("Invalid body template '{}'", name))?;
        }

        let mailer = match config.host.as_deref().filter(|_| config.is_enabled()) {
            Some(host) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                    .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
                    .port(config.port);
                if !config.username.is_empty() {
                    builder = builder.credentials(Credentials::new(
                        config.username.clone(),
                        config.password.clone(),
                    ));
                }
                Some(builder.build())
            }
            None => None,
        };

        Ok(Self {
            from: config.from.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            templates,
            mailer,
        })
    }

    /// Service that only logs, for tests and mail-less deployments
    pub fn disabled(base_url: &str) -> Result<Self> {
        Self::new(&MailConfig::default(), base_url)
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    /// Render `(subject, body)` for a template
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<(String, String)> {
        let mut context = context.clone();
        context.insert("base_url", &self.base_url);
        let subject = self
            .templates
            .render(&format!("{}.subject", template), &context)
            .with_context(|| format!("Failed to render subject '{}'", template))?;
        let body = self
            .templates
            .render(&format!("{}.txt", template), &context)
            .with_context(|| format!("Failed to render body '{}'", template))?;
        Ok((subject, body))
    }

    pub async fn send(&self, to: &str, template: &str, context: &TeraContext) -> Result<()> {
        let (subject, body) = self.render(template, context)?;

        let Some(mailer) = &self.mailer else {
            tracing::info!("Mail disabled, skipping '{}' to {}", template, to);
            return Ok(());
        };

        let email = Message::builder()
            .from(self.from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        mailer
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }

    /// Send without blocking the caller; failures are logged
    pub fn spawn_send(self: &Arc<Self>, to: String, template: &'static str, context: TeraContext) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.send(&to, template, &context).await {
                tracing::warn!("Failed to send '{}' mail to {}: {:#}", template, to, e);
            }
        });
    }

    pub fn send_welcome(self: &Arc<Self>, user: &User) {
        let mut context = TeraContext::new();
        context.insert("name", &user.full_name);
        self.spawn_send(user.email.clone(), "welcome", context);
    }

    pub fn send_password_reset(self: &Arc<Self>, user: &User, token: &str) {
        let mut context = TeraContext::new();
        context.insert("name", &user.full_name);
        context.insert(
            "reset_url",
            &format!("{}/reset-password?token={}", self.base_url, token),
        );
        self.spawn_send(user.email.clone(), "password_reset", context);
    }

    pub fn send_application_submitted(
        self: &Arc<Self>,
        user: &User,
        university: &str,
        program: Option<&str>,
    ) {
        let mut context = TeraContext::new();
        context.insert("name", &user.full_name);
        context.insert("university", university);
        context.insert("program", &program);
        self.spawn_send(user.email.clone(), "application_submitted", context);
    }

    pub fn send_subscription_activated(
        self: &Arc<Self>,
        user: &User,
        plan: &str,
        expires_at: DateTime<Utc>,
    ) {
        let mut context = TeraContext::new();
        context.insert("name", &user.full_name);
        context.insert("plan", plan);
        context.insert("expires", &expires_at.format("%Y-%m-%d").to_string());
        self.spawn_send(user.email.clone(), "subscription_activated", context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_host() {
        let service = EmailService::disabled("http://localhost:3000/").unwrap();
        assert!(!service.is_enabled());
    }

    #[test]
    fn test_render_templates() {
        let service = EmailService::disabled("https://unibridge.test/").unwrap();

        let mut context = TeraContext::new();
        context.insert("name", "Ana");
        context.insert("university", "Kyoto University");
        context.insert("program", &Some("MSc Robotics"));
        let (subject, body) = service.render("application_submitted", &context).unwrap();
        assert_eq!(subject, "Application submitted: Kyoto University");
        assert!(body.contains("Kyoto University (MSc Robotics)"));
        assert!(body.contains("https://unibridge.test/applications"));

        let mut context = TeraContext::new();
        context.insert("name", "Ana");
        context.insert("reset_url", "https://unibridge.test/reset-password?token=abc");
        let (_, body) = service.render("password_reset", &context).unwrap();
        assert!(body.contains("token=abc"));
    }

    #[tokio::test]
    async fn test_send_is_noop_when_disabled() {
        let service = EmailService::disabled("http://localhost").unwrap();
        let mut context = TeraContext::new();
        context.insert("name", "Ana");
        service.send("ana@example.com", "welcome", &context).await.unwrap();
    }
}
