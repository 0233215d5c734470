//! End-to-end submission: the wizard talks to the intake router over a real socket.

use std::sync::Arc;

use credential_intake::workflows::application::catalog::PackageTier;
use credential_intake::workflows::application::domain::{
    PaymentStatus, ReviewConsent, SectionData,
};
use credential_intake::workflows::application::intake_router;
use credential_intake::workflows::application::services::{IntakeComponents, IntakeServices};
use credential_intake::workflows::application::verification::{
    FixedCodeGenerator, MemoryChallengeStore,
};
use credential_intake::workflows::application::wizard::{
    DraftStorage, FileDraftStorage, HttpIntakeGateway, Step, StepWizard, SubmissionOutcome,
    Transition,
};
use credential_intake::workflows::application::documents::{MemoryDocumentStore, UploadedFile};
use credential_intake::workflows::application::wizard::StayPut;

mod common {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use credential_intake::workflows::application::domain::{
        EducationEntry, EducationHistory, PaymentRecord, PaymentStatus, PersonalInfo,
    };
    use credential_intake::workflows::application::notifications::{
        Mailer, OutboundEmail, SenderIdentity, TransportError,
    };
    use credential_intake::workflows::application::payment::{
        PaymentIntent, PaymentProcessor, ProcessorError,
    };

    pub const ADMIN: &str = "intake@example.org";
    pub const APPLICANT: &str = "grace@example.com";

    pub fn sender() -> SenderIdentity {
        SenderIdentity {
            from_address: "no-reply@example.org".to_string(),
            admin_address: ADMIN.to_string(),
            organization: "Center of Education Transition".to_string(),
        }
    }

    pub fn personal_info() -> PersonalInfo {
        PersonalInfo {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: " grace@example.com ".to_string(),
            phone: "+1 555 010 1906".to_string(),
            country: "United States".to_string(),
            address: "1 Navy Yard".to_string(),
            city: "Arlington".to_string(),
            state: Some("VA".to_string()),
            zip_code: "22202".to_string(),
        }
    }

    pub fn education() -> EducationHistory {
        EducationHistory {
            education_history: vec![EducationEntry {
                institution: "Yale University".to_string(),
                country: "United States".to_string(),
                degree_type: "Doctorate".to_string(),
                field_of_study: "Mathematics".to_string(),
                start_year: "1930".to_string(),
                end_year: "1934".to_string(),
                gpa: None,
            }],
        }
    }

    #[derive(Default)]
    pub struct Outbox {
        sent: Mutex<Vec<OutboundEmail>>,
    }

    impl Outbox {
        pub fn to(&self, address: &str) -> Vec<OutboundEmail> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|email| email.to == address)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl Mailer for Outbox {
        async fn send(&self, email: OutboundEmail) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    /// Processor where the test decides when a payment settles.
    #[derive(Default)]
    pub struct Ledger {
        payments: Mutex<HashMap<String, PaymentRecord>>,
        sequence: AtomicUsize,
    }

    impl Ledger {
        pub fn settle(&self, reference: &str, status: &str) {
            if let Some(record) = self.payments.lock().unwrap().get_mut(reference) {
                record.status = PaymentStatus::new(status);
            }
        }

        pub fn amount_of(&self, reference: &str) -> Option<i64> {
            self.payments
                .lock()
                .unwrap()
                .get(reference)
                .map(|record| record.amount)
        }
    }

    #[async_trait]
    impl PaymentProcessor for Ledger {
        async fn create_intent(
            &self,
            amount_minor: i64,
            currency: &str,
        ) -> Result<PaymentIntent, ProcessorError> {
            let reference = format!("pi_e2e_{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
            self.payments.lock().unwrap().insert(
                reference.clone(),
                PaymentRecord {
                    reference: reference.clone(),
                    status: PaymentStatus::new(PaymentStatus::REQUIRES_PAYMENT_METHOD),
                    amount: amount_minor,
                    currency: currency.to_string(),
                },
            );
            Ok(PaymentIntent {
                client_secret: format!("{reference}_secret"),
                reference,
                amount: amount_minor,
                currency: currency.to_string(),
            })
        }

        async fn retrieve(&self, reference: &str) -> Result<PaymentRecord, ProcessorError> {
            self.payments
                .lock()
                .unwrap()
                .get(reference)
                .cloned()
                .ok_or_else(|| ProcessorError::Rejected {
                    status: 404,
                    message: format!("No such payment_intent: '{reference}'"),
                })
        }
    }

    pub fn code_in(email: &OutboundEmail) -> String {
        email
            .text
            .split(|c: char| !c.is_ascii_digit())
            .find(|run| run.len() == 6)
            .expect("six digit code")
            .to_string()
    }
}

use common::*;

struct Pipeline {
    outbox: Arc<Outbox>,
    ledger: Arc<Ledger>,
    storage: Arc<FileDraftStorage>,
    wizard: StepWizard,
    _draft_dir: tempfile::TempDir,
}

async fn pipeline() -> Pipeline {
    let outbox = Arc::new(Outbox::default());
    let ledger = Arc::new(Ledger::default());
    let mut components = IntakeComponents::new(
        Arc::new(MemoryChallengeStore::default()),
        Arc::new(MemoryDocumentStore::default()),
        ledger.clone(),
        outbox.clone(),
        sender(),
    );
    components.code_generator = Arc::new(FixedCodeGenerator::new(["731904"]));
    let services = Arc::new(IntakeServices::new(components));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let address = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, intake_router(services))
            .await
            .expect("serve");
    });

    let draft_dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(FileDraftStorage::new(draft_dir.path()));
    let gateway =
        Arc::new(HttpIntakeGateway::new(&format!("http://{address}")).expect("gateway"));
    let wizard = StepWizard::new(gateway, storage.clone(), Arc::new(StayPut));

    Pipeline {
        outbox,
        ledger,
        storage,
        wizard,
        _draft_dir: draft_dir,
    }
}

/// Walk the wizard to the payment step and open an intent.
async fn reach_payment(pipeline: &mut Pipeline) -> String {
    let wizard = &mut pipeline.wizard;

    wizard.update_section(SectionData::PersonalInfo(personal_info()));
    assert_eq!(
        wizard.next().await.expect("code requested"),
        Transition::AwaitingVerification {
            email: APPLICANT.to_string()
        }
    );
    let mail = pipeline.outbox.to(APPLICANT);
    assert_eq!(mail.len(), 1);
    let code = code_in(&mail[0]);
    assert_eq!(code, "731904");
    assert_eq!(
        wizard.confirm_email(&code).await.expect("verified"),
        Transition::Advanced(Step::Education)
    );

    wizard.update_section(SectionData::Education(education()));
    wizard.next().await.expect("education accepted");

    let reference = wizard
        .upload_document(UploadedFile {
            name: "Transcript.PDF".to_string(),
            content_type: Some("application/pdf".to_string()),
            document_type: "Transcript".to_string(),
            bytes: b"%PDF-1.4 transcript".to_vec(),
        })
        .await
        .expect("uploaded");
    assert!(reference.locator.starts_with("user-uploads/"));
    assert!(reference.locator.ends_with(".pdf"));
    wizard.next().await.expect("documents accepted");

    wizard.select_package(PackageTier::CareerSuccess);
    wizard.next().await.expect("package accepted");
    wizard.update_section(SectionData::ReviewData(ReviewConsent {
        terms_accepted: true,
        payment_id: None,
    }));
    assert_eq!(
        wizard.next().await.expect("review accepted"),
        Transition::Advanced(Step::Payment)
    );
    assert!(pipeline.storage.load().await.expect("load").is_some());

    let token = pipeline.wizard.begin_payment().await.expect("token");
    assert_eq!(token.as_str(), "pi_e2e_1_secret");
    assert_eq!(pipeline.ledger.amount_of("pi_e2e_1"), Some(34900));
    "pi_e2e_1".to_string()
}

#[tokio::test]
async fn paid_application_reaches_staff_with_attachment() {
    let mut pipeline = pipeline().await;
    let reference = reach_payment(&mut pipeline).await;
    pipeline.ledger.settle(&reference, PaymentStatus::SUCCEEDED);

    let outcome = pipeline
        .wizard
        .complete_submission(&reference, &PaymentStatus::new(PaymentStatus::SUCCEEDED))
        .await;

    match &outcome {
        SubmissionOutcome::Submitted { receipt, .. } => {
            assert_eq!(receipt.payment_reference.as_deref(), Some("pi_e2e_1"));
            assert!(receipt.applicant_notified);
        }
        other => panic!("expected submission, got {other:?}"),
    }
    assert!(pipeline.storage.load().await.expect("load").is_none());

    let admin = pipeline.outbox.to(ADMIN);
    assert_eq!(admin.len(), 1);
    assert_eq!(admin[0].subject, "New Application: Grace Hopper");
    assert_eq!(admin[0].reply_to.as_deref(), Some(APPLICANT));
    assert_eq!(admin[0].attachments.len(), 1);
    assert_eq!(admin[0].attachments[0].bytes, b"%PDF-1.4 transcript".to_vec());
    assert!(admin[0].html.contains("$349.00 USD"));

    let applicant = pipeline.outbox.to(APPLICANT);
    assert_eq!(applicant.len(), 2);
    assert!(applicant[1].text.contains("Transaction ID: pi_e2e_1"));
}

#[tokio::test]
async fn unsettled_payment_is_refused_and_draft_kept() {
    let mut pipeline = pipeline().await;
    let reference = reach_payment(&mut pipeline).await;

    // Client believes the payment succeeded; the processor disagrees.
    let outcome = pipeline
        .wizard
        .complete_submission(&reference, &PaymentStatus::new(PaymentStatus::SUCCEEDED))
        .await;

    assert!(!outcome.is_submitted());
    assert!(outcome.message().starts_with("Submission Failed"));
    assert!(pipeline.outbox.to(ADMIN).is_empty());
    assert!(pipeline.storage.load().await.expect("load").is_some());

    let outcome = pipeline
        .wizard
        .complete_submission(&reference, &PaymentStatus::new(PaymentStatus::PROCESSING))
        .await;
    assert!(matches!(outcome, SubmissionOutcome::Processing { .. }));
    assert!(pipeline.storage.load().await.expect("load").is_some());
}
