//! Templated email delivery over a single process-wide transport.

mod smtp;
pub mod templates;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tracing::{debug, info};

use super::documents::{ResolvedAttachment, ResolvedDocument};
use super::domain::{DraftApplication, PaymentRecord};
use templates::{Branding, DocumentListing, ListingDelivery, RenderedMessage};

pub use smtp::{LogMailer, SmtpMailer};

/// A fully rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Mail transport capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid mailbox '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("transport rejected message: {0}")]
    Delivery(String),
}

/// Addresses and branding used for every outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub from_address: String,
    pub admin_address: String,
    pub organization: String,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to deliver {kind} email: {source}")]
pub struct NotificationError {
    pub kind: &'static str,
    #[source]
    pub source: TransportError,
}

/// Renders the three message kinds and hands them to the configured [`Mailer`].
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    sender: SenderIdentity,
}

impl NotificationDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, sender: SenderIdentity) -> Self {
        Self { mailer, sender }
    }

    pub fn sender(&self) -> &SenderIdentity {
        &self.sender
    }

    pub async fn send_verification_code(
        &self,
        email: &str,
        code: &str,
        valid_minutes: i64,
    ) -> Result<(), NotificationError> {
        let rendered = templates::verification_code(&self.branding(), code, valid_minutes);
        let message = self.compose(email.to_string(), None, rendered, Vec::new());
        self.deliver("verification", message).await?;
        debug!(email, "verification code dispatched");
        Ok(())
    }

    /// Staff notice with the entire draft, the payment, and every resolved document.
    pub async fn send_admin_application(
        &self,
        draft: &DraftApplication,
        payment: &PaymentRecord,
        documents: &[ResolvedAttachment],
    ) -> Result<(), NotificationError> {
        let mut listings = Vec::with_capacity(documents.len());
        let mut attachments = Vec::new();
        for document in documents {
            let delivery = match &document.content {
                ResolvedDocument::Inline {
                    bytes,
                    content_type,
                } => {
                    attachments.push(EmailAttachment {
                        filename: document.reference.name.clone(),
                        content_type: content_type.clone(),
                        bytes: bytes.clone(),
                    });
                    ListingDelivery::Attached
                }
                ResolvedDocument::Link { url } => ListingDelivery::Link(url.clone()),
            };
            listings.push(DocumentListing {
                name: document.reference.name.clone(),
                document_type: document.reference.document_type.clone(),
                delivery,
            });
        }

        let rendered = templates::admin_application(&self.branding(), draft, payment, &listings);
        let reply_to = Some(draft.personal_info.email.trim().to_string())
            .filter(|address| !address.is_empty());
        let message = self.compose(
            self.sender.admin_address.clone(),
            reply_to,
            rendered,
            attachments,
        );
        self.deliver("admin application", message).await?;
        info!(
            payment_reference = %payment.reference,
            documents = documents.len(),
            "admin application notice sent"
        );
        Ok(())
    }

    pub async fn send_applicant_confirmation(
        &self,
        draft: &DraftApplication,
        payment: &PaymentRecord,
    ) -> Result<(), NotificationError> {
        let rendered = templates::applicant_confirmation(&self.branding(), draft, payment);
        let message = self.compose(
            draft.personal_info.email.trim().to_string(),
            Some(self.sender.admin_address.clone()),
            rendered,
            Vec::new(),
        );
        self.deliver("applicant confirmation", message).await?;
        info!(payment_reference = %payment.reference, "applicant confirmation sent");
        Ok(())
    }

    fn branding(&self) -> Branding {
        Branding {
            organization: self.sender.organization.clone(),
            year: Utc::now().year(),
        }
    }

    fn compose(
        &self,
        to: String,
        reply_to: Option<String>,
        rendered: RenderedMessage,
        attachments: Vec<EmailAttachment>,
    ) -> OutboundEmail {
        OutboundEmail {
            from: self.sender.from_address.clone(),
            to,
            reply_to,
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
            attachments,
        }
    }

    async fn deliver(
        &self,
        kind: &'static str,
        message: OutboundEmail,
    ) -> Result<(), NotificationError> {
        self.mailer
            .send(message)
            .await
            .map_err(|source| NotificationError { kind, source })
    }
}
