use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::documents::{DocumentIntake, ResolvedDocument};
use super::domain::{DraftApplication, PaymentRecord, PaymentStatus};
use super::notifications::{NotificationDispatcher, NotificationError};
use super::payment::{PaymentAuthorization, PaymentError};

pub const FINALIZED_MESSAGE: &str = "Application finalized successfully.";

/// Ordered stages of one finalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationStage {
    Validating,
    VerifyingPayment,
    ResolvingDocuments,
    NotifyingAdmin,
    NotifyingApplicant,
    Done,
}

impl FinalizationStage {
    pub const fn label(self) -> &'static str {
        match self {
            FinalizationStage::Validating => "validating",
            FinalizationStage::VerifyingPayment => "verifying_payment",
            FinalizationStage::ResolvingDocuments => "resolving_documents",
            FinalizationStage::NotifyingAdmin => "notifying_admin",
            FinalizationStage::NotifyingApplicant => "notifying_applicant",
            FinalizationStage::Done => "done",
        }
    }
}

/// Finalize payload. The draft stays untyped until the presence check has passed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinalizeRequest {
    #[serde(alias = "paymentIntentId")]
    pub payment_reference: Option<String>,
    #[serde(alias = "formData")]
    pub draft: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationReport {
    pub success: bool,
    pub message: String,
    pub payment_reference: String,
    pub documents_attached: usize,
    pub documents_linked: usize,
    pub documents_dropped: usize,
    pub applicant_notified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FinalizationError {
    #[error("Missing paymentReference or draft.")]
    MissingField,
    #[error("Malformed draft: {0}")]
    MalformedDraft(String),
    #[error("Payment not successful. Status: {status}")]
    PaymentNotSucceeded { status: PaymentStatus },
    #[error("Unable to confirm payment: {0}")]
    PaymentLookup(#[source] PaymentError),
    #[error("Your payment was successful, but the final admin notification could not be sent. Please contact support with Transaction ID: {payment_reference}")]
    AdminNotification {
        payment_reference: String,
        #[source]
        source: NotificationError,
    },
}

/// Turns a confirmed payment plus a completed draft into delivered notifications.
pub struct FinalizationOrchestrator {
    payments: Arc<PaymentAuthorization>,
    documents: Arc<DocumentIntake>,
    notifier: Arc<NotificationDispatcher>,
}

impl FinalizationOrchestrator {
    pub fn new(
        payments: Arc<PaymentAuthorization>,
        documents: Arc<DocumentIntake>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            payments,
            documents,
            notifier,
        }
    }

    pub async fn finalize(
        &self,
        request: FinalizeRequest,
    ) -> Result<FinalizationReport, FinalizationError> {
        enter(FinalizationStage::Validating, "-");
        let reference = request
            .payment_reference
            .map(|reference| reference.trim().to_string())
            .filter(|reference| !reference.is_empty());
        let draft = request.draft.filter(|draft| !draft.is_null());
        let (Some(reference), Some(draft)) = (reference, draft) else {
            return Err(FinalizationError::MissingField);
        };
        let draft: DraftApplication = serde_json::from_value(draft)
            .map_err(|err| FinalizationError::MalformedDraft(err.to_string()))?;

        self.finalize_draft(&reference, &draft).await
    }

    pub async fn finalize_draft(
        &self,
        reference: &str,
        draft: &DraftApplication,
    ) -> Result<FinalizationReport, FinalizationError> {
        enter(FinalizationStage::VerifyingPayment, reference);
        let payment = self
            .payments
            .confirm(reference)
            .await
            .map_err(FinalizationError::PaymentLookup)?;
        if !payment.status.is_succeeded() {
            warn!(
                payment_reference = %reference,
                status = %payment.status,
                "finalize refused; payment not succeeded"
            );
            return Err(FinalizationError::PaymentNotSucceeded {
                status: payment.status,
            });
        }

        enter(FinalizationStage::ResolvingDocuments, reference);
        let resolution = self.documents.resolve_all(&draft.documents.files).await;
        let (attached, linked) = resolution.resolved.iter().fold((0, 0), |(inline, links), doc| {
            match doc.content {
                ResolvedDocument::Inline { .. } => (inline + 1, links),
                ResolvedDocument::Link { .. } => (inline, links + 1),
            }
        });

        enter(FinalizationStage::NotifyingAdmin, reference);
        if let Err(source) = self
            .notifier
            .send_admin_application(draft, &payment, &resolution.resolved)
            .await
        {
            error!(
                payment_reference = %payment.reference,
                error = %source,
                "admin notification failed after successful payment"
            );
            return Err(FinalizationError::AdminNotification {
                payment_reference: payment.reference,
                source,
            });
        }

        enter(FinalizationStage::NotifyingApplicant, reference);
        let applicant_notified = self.notify_applicant_best_effort(draft, &payment).await;

        enter(FinalizationStage::Done, reference);
        info!(
            payment_reference = %payment.reference,
            attached,
            linked,
            dropped = resolution.dropped.len(),
            applicant_notified,
            "application finalized"
        );
        Ok(FinalizationReport {
            success: true,
            message: FINALIZED_MESSAGE.to_string(),
            payment_reference: payment.reference,
            documents_attached: attached,
            documents_linked: linked,
            documents_dropped: resolution.dropped.len(),
            applicant_notified,
        })
    }

    /// The applicant copy never fails the request; the error is logged and discarded.
    async fn notify_applicant_best_effort(
        &self,
        draft: &DraftApplication,
        payment: &PaymentRecord,
    ) -> bool {
        match self
            .notifier
            .send_applicant_confirmation(draft, payment)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    payment_reference = %payment.reference,
                    error = %err,
                    "applicant confirmation not delivered"
                );
                false
            }
        }
    }
}

fn enter(stage: FinalizationStage, reference: &str) {
    debug!(stage = stage.label(), payment_reference = %reference, "finalization stage");
}
