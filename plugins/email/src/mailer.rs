use anyhow::Context;
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use crate::config::EmailConfig;

/// Port of SMTP over implicit TLS.
pub const SMTPS_PORT: u16 = 465;

/// A complete message, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
    pub body: String,
}

/// Something that can deliver an [`Email`].
///
/// `send` blocks until the message has been accepted or rejected.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Sends emails to an SMTP relay, with authentication and TLS.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let builder = if config.smtp_port == SMTPS_PORT {
            SmtpTransport::relay(&config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&config.smtp_host)
        }
        .with_context(|| format!("invalid SMTP relay {}", config.smtp_host))?;

        let credentials = Credentials::new(config.auth_user.clone(), config.auth_password.clone());
        let transport = builder.port(config.smtp_port).credentials(credentials).build();
        Ok(Self { transport })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: &Email) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(email.from.clone())
            .to(email.to.clone())
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .context("invalid email")?;
        let response = self.transport.send(&message).context("SMTP transmission failed")?;
        log::debug!("email accepted by the SMTP server: {:?}", response.code());
        Ok(())
    }
}
