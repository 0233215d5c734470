use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use super::{Mailer, OutboundEmail, TransportError};
use crate::config::SmtpSettings;

const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP delivery through lettre. Built once per process from [`SmtpSettings`].
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Implicit TLS on port 465, STARTTLS otherwise. The timeout bounds connect, greeting
    /// and every socket operation.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, TransportError> {
        let builder = if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
        .map_err(|err| TransportError::Build(format!("smtp relay {}: {err}", settings.host)))?;

        let transport = builder
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.expose().to_string(),
            ))
            .timeout(Some(settings.timeout))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), TransportError> {
        let message = build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| TransportError::Delivery(err.to_string()))?;
        Ok(())
    }
}

fn mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|err| TransportError::Address {
            address: address.to_string(),
            reason: err.to_string(),
        })
}

pub(super) fn build_message(email: OutboundEmail) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(mailbox(&email.from)?)
        .to(mailbox(&email.to)?)
        .subject(email.subject);
    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(mailbox(reply_to)?);
    }

    let body = MultiPart::alternative_plain_html(email.text, email.html);
    let result = if email.attachments.is_empty() {
        builder.multipart(body)
    } else {
        let mut mixed = MultiPart::mixed().multipart(body);
        for attachment in email.attachments {
            let content_type = attachment_content_type(&attachment.filename, &attachment.content_type)?;
            mixed = mixed.singlepart(
                Attachment::new(attachment.filename).body(attachment.bytes, content_type),
            );
        }
        builder.multipart(mixed)
    };

    result.map_err(|err| TransportError::Build(err.to_string()))
}

/// Unparseable attachment types degrade to `application/octet-stream`.
fn attachment_content_type(filename: &str, declared: &str) -> Result<ContentType, TransportError> {
    ContentType::parse(declared.trim())
        .or_else(|err| {
            warn!(%filename, declared, error = %err, "attachment content type unusable; sending as octet-stream");
            ContentType::parse(OCTET_STREAM)
        })
        .map_err(|err| TransportError::Build(format!("{filename}: {err}")))
}

const OCTET_STREAM: &str = "application/octet-stream";

/// Development transport: validates and logs each message instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), TransportError> {
        let to = email.to.clone();
        let subject = email.subject.clone();
        let attachments = email.attachments.len();
        let text = email.text.clone();
        build_message(email)?;
        info!(%to, %subject, attachments, body = %text, "mail transport disabled; message logged");
        Ok(())
    }
}
