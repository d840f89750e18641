use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use keystone_config::EmailConfig;
use lettre::message::header;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{info, instrument};

/// Outbound email. Implementations deliver a plain-text message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let transport = if config.smtp_username.is_empty() {
            SmtpTransport::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build()
        } else {
            let creds = Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            );

            SmtpTransport::relay(&config.smtp_host)
                .with_context(|| format!("failed to create SMTP relay for {}", config.smtp_host))?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, body))]
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|e| anyhow!("invalid from address: {e}"))?)
            .to(to.parse().map_err(|e| anyhow!("invalid recipient address: {e}"))?)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build email")?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .context("email task panicked")?
            .context("failed to send email")?;

        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Used when no SMTP
/// host is configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to = %to, subject = %subject, body = %body, "Email (not sent, SMTP disabled)");
        Ok(())
    }
}

pub fn mailer_from_config(config: &EmailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    if config.smtp_enabled() {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// Formats the account emails and hands them to a [`Mailer`].
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    app_url: String,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, app_url: impl Into<String>) -> Self {
        Self {
            mailer,
            app_url: app_url.into(),
        }
    }

    #[instrument(skip(self, token))]
    pub async fn send_reset_password_email(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let link = format!("{}/reset-password?token={}", self.app_url, token);
        let body = format!(
            "Dear user,\n\n\
             To reset your password, click on this link: {link}\n\n\
             If you did not request any password resets, then ignore this email."
        );

        self.mailer.send(to, "Reset password", &body).await
    }

    #[instrument(skip(self, token))]
    pub async fn send_verification_email(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let link = format!("{}/verify-email?token={}", self.app_url, token);
        let body = format!(
            "Dear user,\n\n\
             To verify your email, click on this link: {link}\n\n\
             If you did not create an account, then ignore this email."
        );

        self.mailer.send(to, "Email Verification", &body).await
    }
}
