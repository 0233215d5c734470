use std::sync::Arc;

use async_trait::async_trait;

use super::common::*;
use crate::workflows::application::catalog::PackageTier;
use crate::workflows::application::domain::{
    DraftApplication, EducationHistory, PaymentStatus, PersonalInfo, ReviewConsent, SectionData,
};
use crate::workflows::application::wizard::handoff::{
    MISSING_DRAFT_MESSAGE, PAYMENT_FAILED_MESSAGE, PROCESSING_MESSAGE, SUBMITTED_MESSAGE,
};
use crate::workflows::application::wizard::{
    complete_submission, BackOutcome, DraftStorage, DraftStorageError, LocalIntakeGateway,
    MemoryDraftStorage, Step, StepWizard, SubmissionOutcome, Transition, WizardError,
};

struct Fixture {
    harness: Harness,
    storage: Arc<MemoryDraftStorage>,
    navigator: Arc<RecordingNavigator>,
    wizard: StepWizard,
}

fn fixture(harness: Harness) -> Fixture {
    let storage = Arc::new(MemoryDraftStorage::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let gateway = Arc::new(LocalIntakeGateway::new(harness.services.clone()));
    let wizard = StepWizard::new(gateway, storage.clone(), navigator.clone());
    Fixture {
        harness,
        storage,
        navigator,
        wizard,
    }
}

struct BrokenStorage;

#[async_trait]
impl DraftStorage for BrokenStorage {
    async fn save(&self, _draft: &DraftApplication) -> Result<(), DraftStorageError> {
        Err(DraftStorageError::Unavailable("quota exceeded".to_string()))
    }

    async fn load(&self) -> Result<Option<DraftApplication>, DraftStorageError> {
        Ok(None)
    }

    async fn clear(&self) -> Result<(), DraftStorageError> {
        Ok(())
    }
}

/// Fill and verify step 1, leaving the wizard on Education.
async fn pass_identity(wizard: &mut StepWizard, mailer: &RecordingMailer) {
    wizard.update_section(SectionData::PersonalInfo(personal_info()));
    let transition = wizard.next().await.expect("code requested");
    assert_eq!(
        transition,
        Transition::AwaitingVerification {
            email: APPLICANT.to_string()
        }
    );
    let code = mailer.last_code_for(APPLICANT).expect("code mailed");
    let transition = wizard.confirm_email(&code).await.expect("verified");
    assert_eq!(transition, Transition::Advanced(Step::Education));
}

/// Drive the wizard from Education to the review step with one uploaded document.
async fn fill_to_review(wizard: &mut StepWizard, tier: PackageTier) {
    wizard.update_section(SectionData::Education(education()));
    wizard.next().await.expect("education done");
    wizard
        .upload_document(pdf("diploma.pdf"))
        .await
        .expect("uploaded");
    wizard.next().await.expect("documents done");
    wizard.select_package(tier);
    wizard.next().await.expect("package done");
    wizard.update_section(SectionData::ReviewData(ReviewConsent {
        terms_accepted: true,
        payment_id: None,
    }));
    assert_eq!(wizard.current_step(), Step::Review);
}

#[tokio::test]
async fn invalid_section_leaves_step_unchanged() {
    let mut fixture = fixture(harness());

    let err = fixture.wizard.next().await.expect_err("empty identity");
    match err {
        WizardError::Validation(validation) => {
            assert_eq!(validation.field, "firstName");
            assert_eq!(
                validation.message,
                "First name must be at least 2 characters."
            );
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(fixture.wizard.current_step(), Step::PersonalInfo);
    assert!(fixture.harness.mailer.attempted().is_empty());

    pass_identity(&mut fixture.wizard, &fixture.harness.mailer).await;
    fixture
        .wizard
        .update_section(SectionData::Education(EducationHistory::default()));
    let err = fixture.wizard.next().await.expect_err("no education");
    assert_eq!(
        err.to_string(),
        "Please add at least one education entry to proceed."
    );
    assert_eq!(fixture.wizard.current_step(), Step::Education);
}

async fn assert_refused(wizard: &mut StepWizard, field: &str, message: &str) {
    let step = wizard.current_step();
    match wizard.next().await.expect_err("section refused") {
        WizardError::Validation(validation) => {
            assert_eq!(validation.field, field);
            assert_eq!(validation.message, message);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(wizard.current_step(), step);
    assert!(!wizard.is_busy());
}

#[tokio::test]
async fn every_section_refuses_incomplete_input() {
    let mut fixture = fixture(harness());
    let wizard = &mut fixture.wizard;

    assert_refused(wizard, "firstName", "First name must be at least 2 characters.").await;
    pass_identity(wizard, &fixture.harness.mailer).await;

    assert_refused(
        wizard,
        "educationHistory",
        "Please add at least one education entry to proceed.",
    )
    .await;
    wizard.update_section(SectionData::Education(education()));
    wizard.next().await.expect("education done");

    assert_eq!(wizard.current_step(), Step::Documents);
    assert_refused(wizard, "files", "Please upload at least one document.").await;
    wizard
        .upload_document(pdf("diploma.pdf"))
        .await
        .expect("uploaded");
    wizard.next().await.expect("documents done");

    assert_eq!(wizard.current_step(), Step::Package);
    assert_refused(wizard, "id", "Please select an evaluation package.").await;
    wizard.select_package(PackageTier::EssentialDocument);
    wizard.next().await.expect("package done");

    assert_eq!(wizard.current_step(), Step::Review);
    assert_refused(
        wizard,
        "termsAccepted",
        "You must accept the terms and conditions to submit.",
    )
    .await;
    assert_eq!(fixture.storage.load().await.expect("readable"), None);
}

#[tokio::test]
async fn confirm_is_refused_away_from_identity_step() {
    let mut fixture = fixture(harness());
    pass_identity(&mut fixture.wizard, &fixture.harness.mailer).await;

    let err = fixture
        .wizard
        .confirm_email("482913")
        .await
        .expect_err("not on identity step");
    assert!(matches!(
        err,
        WizardError::WrongStep {
            expected: Step::PersonalInfo
        }
    ));
    assert_eq!(fixture.wizard.current_step(), Step::Education);
    assert!(fixture.wizard.is_email_verified());
}

#[tokio::test]
async fn wrong_code_keeps_wizard_on_identity_step() {
    let mut fixture = fixture(harness());
    fixture
        .wizard
        .update_section(SectionData::PersonalInfo(personal_info()));
    fixture.wizard.next().await.expect("code requested");

    let err = fixture
        .wizard
        .confirm_email("000000")
        .await
        .expect_err("wrong code");
    assert_eq!(err.to_string(), "Invalid or expired verification code.");
    assert_eq!(fixture.wizard.current_step(), Step::PersonalInfo);
    assert!(!fixture.wizard.is_email_verified());

    fixture.wizard.resend_code().await.expect("resent");
    let code = fixture
        .harness
        .mailer
        .last_code_for(APPLICANT)
        .expect("code");
    fixture.wizard.confirm_email(&code).await.expect("verified");
    assert_eq!(fixture.wizard.current_step(), Step::Education);
}

#[tokio::test]
async fn confirm_without_request_is_refused() {
    let mut fixture = fixture(harness());
    fixture
        .wizard
        .update_section(SectionData::PersonalInfo(personal_info()));
    let err = fixture
        .wizard
        .confirm_email("482913")
        .await
        .expect_err("nothing pending");
    assert!(matches!(err, WizardError::NoPendingVerification { .. }));
}

#[tokio::test]
async fn verified_email_is_remembered_until_it_changes() {
    let mut fixture = fixture(harness());
    pass_identity(&mut fixture.wizard, &fixture.harness.mailer).await;
    let mails_after_verification = fixture.harness.mailer.delivered().len();

    assert_eq!(fixture.wizard.back(), BackOutcome::Moved(Step::PersonalInfo));
    assert_eq!(
        fixture.wizard.next().await.expect("still verified"),
        Transition::Advanced(Step::Education)
    );
    assert_eq!(
        fixture.harness.mailer.delivered().len(),
        mails_after_verification
    );

    fixture.wizard.back();
    fixture
        .wizard
        .update_section(SectionData::PersonalInfo(PersonalInfo {
            email: "grace@example.com".to_string(),
            ..personal_info()
        }));
    assert!(!fixture.wizard.is_email_verified());
    assert_eq!(
        fixture.wizard.next().await.expect("new code"),
        Transition::AwaitingVerification {
            email: "grace@example.com".to_string()
        }
    );
}

#[tokio::test]
async fn back_on_first_step_returns_to_origin() {
    let mut fixture = fixture(harness());
    assert_eq!(fixture.wizard.back(), BackOutcome::ReturnedToOrigin);
    assert_eq!(fixture.navigator.returns(), 1);
    assert_eq!(fixture.wizard.current_step(), Step::PersonalInfo);
}

#[tokio::test]
async fn failed_upload_does_not_grow_document_list() {
    let mut fixture = fixture(harness());
    let first = fixture
        .wizard
        .upload_document(pdf("diploma.pdf"))
        .await
        .expect("first");

    fixture.harness.documents.fail_uploads(true);
    let err = fixture
        .wizard
        .upload_document(pdf("transcript.pdf"))
        .await
        .expect_err("second fails");
    assert!(matches!(err, WizardError::Upload(_)));
    assert!(!fixture.wizard.is_busy());
    assert_eq!(fixture.wizard.draft().documents.files, vec![first.clone()]);

    assert_eq!(fixture.wizard.remove_document(&first.id), Some(first));
    assert!(fixture.wizard.draft().documents.files.is_empty());
}

#[tokio::test]
async fn draft_is_stored_before_payment_and_cleared_after_submission() {
    let mut fixture = fixture(harness());
    assert_eq!(fixture.wizard.progress_percent(), 17);
    pass_identity(&mut fixture.wizard, &fixture.harness.mailer).await;
    fill_to_review(&mut fixture.wizard, PackageTier::EssentialDocument).await;
    assert_eq!(
        fixture.wizard.next().await.expect("review done"),
        Transition::Advanced(Step::Payment)
    );
    assert_eq!(fixture.wizard.progress_percent(), 100);

    let stored = fixture.storage.load().await.expect("readable");
    assert_eq!(stored.as_ref(), Some(fixture.wizard.draft()));

    let token = fixture.wizard.begin_payment().await.expect("token");
    assert_eq!(token.as_str(), "pi_test_1_secret_test");
    assert_eq!(
        fixture.harness.processor.created(),
        vec![(14900, "usd".to_string())]
    );
    assert_eq!(
        fixture.wizard.next().await.expect("final"),
        Transition::AtFinalStep
    );

    fixture.harness.processor.set_status("pi_test_1", "succeeded");
    let outcome = fixture
        .wizard
        .complete_submission("pi_test_1", &PaymentStatus::new("succeeded"))
        .await;

    match &outcome {
        SubmissionOutcome::Submitted { receipt, message } => {
            assert_eq!(message, SUBMITTED_MESSAGE);
            assert_eq!(receipt.payment_reference.as_deref(), Some("pi_test_1"));
            assert!(receipt.applicant_notified);
        }
        other => panic!("expected submission, got {other:?}"),
    }
    assert!(fixture.storage.raw().is_none(), "draft cleared after success");
    let admin = fixture.harness.mailer.delivered_to(ADMIN);
    assert_eq!(admin.len(), 1);
    assert_eq!(admin[0].attachments.len(), 1);
}

#[tokio::test]
async fn storage_failure_keeps_wizard_on_review() {
    let harness = harness();
    let mut wizard = StepWizard::new(
        Arc::new(LocalIntakeGateway::new(harness.services.clone())),
        Arc::new(BrokenStorage),
        Arc::new(RecordingNavigator::default()),
    );
    pass_identity(&mut wizard, &harness.mailer).await;
    fill_to_review(&mut wizard, PackageTier::CareerSuccess).await;

    let err = wizard.next().await.expect_err("save fails");
    assert!(matches!(err, WizardError::Storage(_)));
    assert_eq!(wizard.current_step(), Step::Review);
    assert!(!wizard.is_busy());
}

#[tokio::test]
async fn payment_requires_payment_step() {
    let mut fixture = fixture(harness());
    let err = fixture.wizard.begin_payment().await.expect_err("too early");
    assert!(matches!(
        err,
        WizardError::WrongStep {
            expected: Step::Payment
        }
    ));
}

#[tokio::test]
async fn handoff_interprets_processor_status() {
    let harness = harness_with(
        FakeProcessor::with_payment("pi_1", "succeeded", 14900),
        RecordingMailer::default(),
        &["482913"],
    );
    let gateway = LocalIntakeGateway::new(harness.services.clone());
    let storage = MemoryDraftStorage::default();
    storage
        .save(&complete_draft(Vec::new()))
        .await
        .expect("saved");

    let processing =
        complete_submission(&gateway, &storage, "pi_1", &PaymentStatus::new("processing")).await;
    assert_eq!(processing.message(), PROCESSING_MESSAGE);

    let failed = complete_submission(
        &gateway,
        &storage,
        "pi_1",
        &PaymentStatus::new("requires_payment_method"),
    )
    .await;
    assert_eq!(failed.message(), PAYMENT_FAILED_MESSAGE);

    let odd = complete_submission(&gateway, &storage, "pi_1", &PaymentStatus::new("canceled")).await;
    assert!(matches!(odd, SubmissionOutcome::Failed { .. }));

    assert!(storage.raw().is_some(), "nothing cleared without finalize");
    assert!(harness.mailer.attempted().is_empty());
}

#[tokio::test]
async fn handoff_without_stored_draft_is_critical() {
    let harness = harness();
    let gateway = LocalIntakeGateway::new(harness.services.clone());
    let storage = MemoryDraftStorage::default();

    let outcome =
        complete_submission(&gateway, &storage, "pi_1", &PaymentStatus::new("succeeded")).await;

    assert_eq!(outcome.message(), MISSING_DRAFT_MESSAGE);
    assert!(!outcome.is_submitted());
}

#[tokio::test]
async fn handoff_keeps_draft_when_finalize_fails() {
    let harness = harness_with(
        FakeProcessor::with_payment("pi_1", "succeeded", 14900),
        RecordingMailer::failing_for(ADMIN),
        &["482913"],
    );
    let gateway = LocalIntakeGateway::new(harness.services.clone());
    let storage = MemoryDraftStorage::default();
    storage
        .save(&complete_draft(Vec::new()))
        .await
        .expect("saved");

    let outcome =
        complete_submission(&gateway, &storage, "pi_1", &PaymentStatus::new("succeeded")).await;

    assert!(outcome.message().starts_with("Submission Failed: "));
    assert!(outcome.message().contains("Transaction ID: pi_1"));
    assert!(storage.raw().is_some());
}
