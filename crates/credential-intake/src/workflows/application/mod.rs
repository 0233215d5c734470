//! Credential-evaluation application submission pipeline.
//!
//! Server side: [`VerificationGate`], [`DocumentIntake`], [`PaymentAuthorization`],
//! [`NotificationDispatcher`] and [`FinalizationOrchestrator`], assembled into
//! [`IntakeServices`] and exposed through [`intake_router`]. Client side: the
//! [`StepWizard`] state machine and its gateway/storage collaborators.

pub mod catalog;
pub mod documents;
pub mod domain;
pub mod finalize;
pub mod notifications;
pub mod payment;
pub mod router;
pub mod services;
pub mod validation;
pub mod verification;
pub mod wizard;

#[cfg(test)]
mod tests;

pub use catalog::{catalog, PackageSelection, PackageTier};
pub use documents::{
    DocumentCollector, DocumentIntake, DocumentStore, DocumentUploader,
    OrphanReconciler, ReconciliationReport, StorageError, UploadError, UploadPolicy,
    UploadedFile,
};
pub use domain::{
    DocumentReference, DocumentSet, DraftApplication, EducationEntry, EducationHistory,
    PaymentRecord, PaymentStatus, PersonalInfo, ReviewConsent, SectionData, SectionKey,
};
pub use finalize::{
    FinalizationError, FinalizationOrchestrator, FinalizationReport, FinalizeRequest,
};
pub use notifications::{Mailer, NotificationDispatcher, OutboundEmail, SenderIdentity};
pub use payment::{AuthorizationToken, ChargeRequest, PaymentAuthorization, PaymentProcessor};
pub use router::intake_router;
pub use services::{IntakeComponents, IntakeServices};
pub use validation::{validate_section, ValidationError};
pub use verification::{ChallengeError, ChallengeStore, VerificationError, VerificationGate};
pub use wizard::{
    BackOutcome, DraftStorage, IntakeGateway, OriginNavigator, Step, StepWizard,
    SubmissionOutcome, Transition, WizardError,
};
