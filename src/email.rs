use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// Outbound mail transport. Best-effort delivery; callers decide what a
/// failure means (the forgot-password flow rolls back its reset token).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        // Plain connection; the relay (e.g. mailtrap) terminates TLS itself
        // when needed.
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        let from = config
            .from
            .parse()
            .context("EMAIL_FROM is not a valid mailbox")?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().context("recipient is not a valid mailbox")?)
            .subject(subject)
            .body(body.to_string())
            .context("build email")?;
        self.transport.send(message).await.context("smtp send")?;
        tracing::debug!(%to, %subject, "email sent");
        Ok(())
    }
}

/// Drops every message. Used by `AppState::fake` in tests.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
