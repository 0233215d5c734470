//! Client-held step state machine for the application flow.
//!
//! The wizard owns the draft and the current step. Server work goes through an
//! [`IntakeGateway`]; the draft is persisted through [`DraftStorage`] right before the
//! payment step so the post-payment handoff can find it again.

pub mod gateway;
pub mod handoff;
pub mod storage;

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use super::catalog::PackageTier;
use super::documents::{DocumentCollector, UploadError, UploadedFile};
use super::domain::{DocumentReference, DraftApplication, PaymentStatus, SectionData, SectionKey};
use super::payment::{AuthorizationToken, ChargeRequest};
use super::validation::{validate_package, validate_section, ValidationError};
use super::verification::normalize_email;

pub use gateway::{
    FinalizationReceipt, GatewayError, HttpIntakeGateway, IntakeGateway, LocalIntakeGateway,
};
pub use handoff::{complete_submission, SubmissionOutcome};
pub use storage::{
    DraftStorage, DraftStorageError, FileDraftStorage, MemoryDraftStorage, DRAFT_STORAGE_KEY,
};

/// The six wizard steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    PersonalInfo = 1,
    Education = 2,
    Documents = 3,
    Package = 4,
    Review = 5,
    Payment = 6,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::PersonalInfo,
        Step::Education,
        Step::Documents,
        Step::Package,
        Step::Review,
        Step::Payment,
    ];

    pub const fn number(self) -> u8 {
        self as u8
    }

    pub const fn title(self) -> &'static str {
        match self {
            Step::PersonalInfo => "Personal Info",
            Step::Education => "Education",
            Step::Documents => "Documents",
            Step::Package => "Package",
            Step::Review => "Review",
            Step::Payment => "Payment",
        }
    }

    /// Section whose contract gates leaving this step. Payment reuses the review contract.
    pub const fn section(self) -> SectionKey {
        match self {
            Step::PersonalInfo => SectionKey::PersonalInfo,
            Step::Education => SectionKey::Education,
            Step::Documents => SectionKey::Documents,
            Step::Package => SectionKey::SelectedPackage,
            Step::Review | Step::Payment => SectionKey::ReviewData,
        }
    }

    pub fn next(self) -> Option<Step> {
        Self::ALL.get(self.number() as usize).copied()
    }

    pub fn previous(self) -> Option<Step> {
        match self.number() {
            1 => None,
            n => Self::ALL.get(n as usize - 2).copied(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Advanced(Step),
    /// A code was sent; call [`StepWizard::confirm_email`] with it to move on.
    AwaitingVerification { email: String },
    AtFinalStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOutcome {
    Moved(Step),
    ReturnedToOrigin,
}

/// Where `back()` on the first step leads.
pub trait OriginNavigator: Send + Sync {
    fn return_to_origin(&self);
}

/// Navigator that does nothing; for headless drivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct StayPut;

impl OriginNavigator for StayPut {
    fn return_to_origin(&self) {}
}

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("No verification code has been requested for {email}.")]
    NoPendingVerification { email: String },
    #[error("{0}")]
    Verification(#[source] GatewayError),
    #[error(transparent)]
    Gateway(GatewayError),
    #[error("Could not save your application before payment: {0}")]
    Storage(#[from] DraftStorageError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("This action is only available on the {expected} step.")]
    WrongStep { expected: Step },
}

pub struct StepWizard {
    step: Step,
    draft: DraftApplication,
    verified_email: Option<String>,
    pending_email: Option<String>,
    busy: bool,
    gateway: Arc<dyn IntakeGateway>,
    storage: Arc<dyn DraftStorage>,
    origin: Arc<dyn OriginNavigator>,
}

impl StepWizard {
    pub fn new(
        gateway: Arc<dyn IntakeGateway>,
        storage: Arc<dyn DraftStorage>,
        origin: Arc<dyn OriginNavigator>,
    ) -> Self {
        Self {
            step: Step::PersonalInfo,
            draft: DraftApplication::default(),
            verified_email: None,
            pending_email: None,
            busy: false,
            gateway,
            storage,
            origin,
        }
    }

    pub fn current_step(&self) -> Step {
        self.step
    }

    pub fn draft(&self) -> &DraftApplication {
        &self.draft
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn progress_percent(&self) -> u8 {
        let total = Step::ALL.len() as u16;
        ((u16::from(self.step.number()) * 100 + total / 2) / total) as u8
    }

    /// True when the identity email is the one that passed verification.
    pub fn is_email_verified(&self) -> bool {
        let current = normalize_email(&self.draft.personal_info.email);
        self.verified_email.as_deref() == Some(current.as_str())
    }

    /// Replace one section wholesale.
    pub fn update_section(&mut self, data: SectionData) {
        self.draft.replace_section(data);
    }

    pub fn select_package(&mut self, tier: PackageTier) {
        self.update_section(SectionData::SelectedPackage(tier.selection()));
    }

    pub async fn next(&mut self) -> Result<Transition, WizardError> {
        validate_section(&self.draft, self.step.section())?;

        match self.step {
            Step::PersonalInfo if !self.is_email_verified() => {
                let email = normalize_email(&self.draft.personal_info.email);
                self.busy = true;
                let sent = self.gateway.request_code(&email).await;
                self.busy = false;
                sent.map_err(WizardError::Gateway)?;
                info!(email = %email, "verification code requested");
                self.pending_email = Some(email.clone());
                Ok(Transition::AwaitingVerification { email })
            }
            Step::Review => {
                self.busy = true;
                let saved = self.storage.save(&self.draft).await;
                self.busy = false;
                saved?;
                Ok(self.advance())
            }
            Step::Payment => Ok(Transition::AtFinalStep),
            _ => Ok(self.advance()),
        }
    }

    /// Check the emailed code and, on success, leave the identity step.
    pub async fn confirm_email(&mut self, code: &str) -> Result<Transition, WizardError> {
        if self.step != Step::PersonalInfo {
            return Err(WizardError::WrongStep {
                expected: Step::PersonalInfo,
            });
        }
        let email = normalize_email(&self.draft.personal_info.email);
        if self.pending_email.as_deref() != Some(email.as_str()) {
            return Err(WizardError::NoPendingVerification { email });
        }

        self.busy = true;
        let verified = self.gateway.verify_code(&email, code.trim()).await;
        self.busy = false;
        verified.map_err(WizardError::Verification)?;

        self.pending_email = None;
        self.verified_email = Some(email);
        Ok(self.advance())
    }

    pub async fn resend_code(&mut self) -> Result<(), WizardError> {
        let email = normalize_email(&self.draft.personal_info.email);
        self.busy = true;
        let sent = self.gateway.resend_code(&email).await;
        self.busy = false;
        sent.map_err(WizardError::Gateway)?;
        self.pending_email = Some(email);
        Ok(())
    }

    pub fn back(&mut self) -> BackOutcome {
        match self.step.previous() {
            Some(previous) => {
                self.step = previous;
                BackOutcome::Moved(previous)
            }
            None => {
                self.origin.return_to_origin();
                BackOutcome::ReturnedToOrigin
            }
        }
    }

    pub async fn upload_document(
        &mut self,
        file: UploadedFile,
    ) -> Result<DocumentReference, WizardError> {
        self.busy = true;
        let uploaded = DocumentCollector::new(&mut self.draft.documents)
            .upload(self.gateway.as_ref(), file)
            .await;
        self.busy = false;
        Ok(uploaded?)
    }

    pub fn remove_document(&mut self, id: &str) -> Option<DocumentReference> {
        DocumentCollector::new(&mut self.draft.documents).remove(id)
    }

    /// Request an authorization token for the selected package.
    pub async fn begin_payment(&mut self) -> Result<AuthorizationToken, WizardError> {
        if self.step != Step::Payment {
            return Err(WizardError::WrongStep {
                expected: Step::Payment,
            });
        }
        validate_package(&self.draft.selected_package)?;

        let request = ChargeRequest {
            amount: Some(json!(self.draft.selected_package.price)),
            package_id: Some(self.draft.selected_package.id.clone()),
        };
        self.busy = true;
        let token = self.gateway.create_intent(&request).await;
        self.busy = false;
        token.map_err(WizardError::Gateway)
    }

    /// Finish the submission after the processor redirects back with `status`.
    pub async fn complete_submission(
        &mut self,
        payment_reference: &str,
        status: &PaymentStatus,
    ) -> SubmissionOutcome {
        self.busy = true;
        let outcome = handoff::complete_submission(
            self.gateway.as_ref(),
            self.storage.as_ref(),
            payment_reference,
            status,
        )
        .await;
        self.busy = false;
        outcome
    }

    fn advance(&mut self) -> Transition {
        match self.step.next() {
            Some(next) => {
                debug!(from = %self.step, to = %next, "wizard advanced");
                self.step = next;
                Transition::Advanced(next)
            }
            None => Transition::AtFinalStep,
        }
    }
}
