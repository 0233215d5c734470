use tracing::{error, info, warn};

use super::gateway::{FinalizationReceipt, IntakeGateway};
use super::storage::DraftStorage;
use crate::workflows::application::domain::PaymentStatus;

pub const SUBMITTED_MESSAGE: &str = "Success! Your application has been submitted. We've received your application and will contact you shortly.";
pub const PROCESSING_MESSAGE: &str =
    "Your payment is processing. We'll update you when it's complete.";
pub const PAYMENT_FAILED_MESSAGE: &str =
    "Your payment failed. Please try again with another payment method.";
pub const MISSING_DRAFT_MESSAGE: &str = "Critical Error: Application data not found. Your payment might have been processed. Please contact support immediately with your payment details.";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred. Please contact support.";

/// Result of returning from the processor's payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted {
        receipt: FinalizationReceipt,
        message: String,
    },
    Processing {
        message: String,
    },
    PaymentFailed {
        message: String,
    },
    Failed {
        message: String,
    },
}

impl SubmissionOutcome {
    pub fn message(&self) -> &str {
        match self {
            SubmissionOutcome::Submitted { message, .. }
            | SubmissionOutcome::Processing { message }
            | SubmissionOutcome::PaymentFailed { message }
            | SubmissionOutcome::Failed { message } => message,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionOutcome::Submitted { .. })
    }
}

/// Finalize the stored draft once the processor reports `status` for `payment_reference`.
///
/// Stored draft data is cleared only after the server confirms finalization.
pub async fn complete_submission<G, S>(
    gateway: &G,
    storage: &S,
    payment_reference: &str,
    status: &PaymentStatus,
) -> SubmissionOutcome
where
    G: IntakeGateway + ?Sized,
    S: DraftStorage + ?Sized,
{
    let draft = match storage.load().await {
        Ok(Some(draft)) => draft,
        Ok(None) => {
            error!(payment_reference, "no stored draft at payment handoff");
            return SubmissionOutcome::Failed {
                message: MISSING_DRAFT_MESSAGE.to_string(),
            };
        }
        Err(err) => {
            error!(payment_reference, error = %err, "stored draft unreadable at payment handoff");
            return SubmissionOutcome::Failed {
                message: MISSING_DRAFT_MESSAGE.to_string(),
            };
        }
    };

    match status.as_str() {
        PaymentStatus::SUCCEEDED => {}
        PaymentStatus::PROCESSING => {
            return SubmissionOutcome::Processing {
                message: PROCESSING_MESSAGE.to_string(),
            }
        }
        PaymentStatus::REQUIRES_PAYMENT_METHOD => {
            return SubmissionOutcome::PaymentFailed {
                message: PAYMENT_FAILED_MESSAGE.to_string(),
            }
        }
        other => {
            warn!(payment_reference, status = other, "unexpected payment status at handoff");
            return SubmissionOutcome::Failed {
                message: UNEXPECTED_MESSAGE.to_string(),
            };
        }
    }

    match gateway.finalize(payment_reference, &draft).await {
        Ok(receipt) => {
            if let Err(err) = storage.clear().await {
                warn!(payment_reference, error = %err, "finalized but stored draft not cleared");
            }
            info!(payment_reference, "submission complete");
            SubmissionOutcome::Submitted {
                receipt,
                message: SUBMITTED_MESSAGE.to_string(),
            }
        }
        Err(err) => SubmissionOutcome::Failed {
            message: format!(
                "Submission Failed: {err}. Your payment was successful, but we could not save your application. Please contact support."
            ),
        },
    }
}
