use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::info;

use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {0}")]
    Address(String),
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Outbound email collaborator.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), MailError>;
}

pub fn build_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    if config.enabled {
        info!("📧 Email delivery via SMTP {}:{}", config.host, config.port);
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        info!("📧 Email delivery disabled, reset tokens will be logged");
        Ok(Arc::new(LogMailer))
    }
}

fn password_reset_body(token: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "A password reset was requested for your Lotfolio account.\n\n\
         Reset token: {}\n\n\
         The token expires at {} and can be used once.\n\
         If you did not request this, you can ignore this email.",
        token,
        expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

const PASSWORD_RESET_SUBJECT: &str = "Lotfolio password reset";

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let from = format!("{} <{}>", config.from_name, config.from_address)
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {}", config.from_address, e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, to: &str, subject: &str, body: String) -> Result<Message, MailError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {}", to, e)))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), MailError> {
        let email = self.message(to, PASSWORD_RESET_SUBJECT, password_reset_body(token, expires_at))?;
        self.transport
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        info!("✅ Password reset email sent to {}", to);
        Ok(())
    }
}

/// Logs instead of sending; used when `email.enabled` is false.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), MailError> {
        info!(
            "📧 [email disabled] password reset for {} (token {}, expires {})",
            to, token, expires_at
        );
        Ok(())
    }
}
