use std::future::Future;
use std::time::Duration;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{MailConfig, MailTransport};
use crate::error::IntegrationError;

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub html: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> impl Future<Output = Result<(), IntegrationError>> + Send;
}

/// Delivers through an SMTP relay (STARTTLS).
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, IntegrationError> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(|e| IntegrationError::Mail(format!("invalid from address: {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| IntegrationError::Mail(format!("SMTP relay error: {e}")))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), IntegrationError> {
        let to: Mailbox = format!("{} <{}>", email.to_name, email.to)
            .parse()
            .map_err(|e| IntegrationError::Mail(format!("invalid to address: {e}")))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| IntegrationError::Mail(format!("failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| IntegrationError::Mail(format!("failed to send email: {e}")))?;
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), IntegrationError> {
        tracing::info!(to = %email.to, subject = %email.subject, "mail (log transport)");
        tracing::debug!("{}", email.html);
        Ok(())
    }
}

/// The transport chosen by `[mail] transport`.
#[derive(Clone)]
pub enum Transport {
    Smtp(SmtpMailer),
    Log(LogMailer),
}

impl Transport {
    pub fn from_config(config: &MailConfig) -> Result<Self, IntegrationError> {
        Ok(match config.transport {
            MailTransport::Smtp => Transport::Smtp(SmtpMailer::new(config)?),
            MailTransport::Log => Transport::Log(LogMailer),
        })
    }
}

impl Mailer for Transport {
    async fn send(&self, email: &Email) -> Result<(), IntegrationError> {
        match self {
            Transport::Smtp(m) => m.send(email).await,
            Transport::Log(m) => m.send(email).await,
        }
    }
}
