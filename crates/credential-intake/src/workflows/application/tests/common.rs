use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::application::catalog::PackageTier;
use crate::workflows::application::documents::{
    DocumentStore, MemoryDocumentStore, ResolvedDocument, StorageError, StoredObject,
    UploadedFile,
};
use crate::workflows::application::domain::{
    DocumentReference, DocumentSet, DraftApplication, EducationEntry, EducationHistory,
    PaymentRecord, PaymentStatus, PersonalInfo, ReviewConsent,
};
use crate::workflows::application::notifications::{
    Mailer, OutboundEmail, SenderIdentity, TransportError,
};
use crate::workflows::application::payment::{PaymentIntent, PaymentProcessor, ProcessorError};
use crate::workflows::application::services::{IntakeComponents, IntakeServices};
use crate::workflows::application::verification::{FixedCodeGenerator, ManualClock, MemoryChallengeStore};
use crate::workflows::application::wizard::OriginNavigator;

pub(super) const ADMIN: &str = "admissions@example.org";
pub(super) const FROM: &str = "no-reply@example.org";
pub(super) const APPLICANT: &str = "ada@example.com";

pub(super) fn sender() -> SenderIdentity {
    SenderIdentity {
        from_address: FROM.to_string(),
        admin_address: ADMIN.to_string(),
        organization: "Center of Education Transition".to_string(),
    }
}

pub(super) fn personal_info() -> PersonalInfo {
    PersonalInfo {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: APPLICANT.to_string(),
        phone: "+1 555 010 0199".to_string(),
        country: "United Kingdom".to_string(),
        address: "12 St James's Square".to_string(),
        city: "London".to_string(),
        state: None,
        zip_code: "SW1Y 4JH".to_string(),
    }
}

pub(super) fn education() -> EducationHistory {
    EducationHistory {
        education_history: vec![EducationEntry {
            institution: "University of London".to_string(),
            country: "United Kingdom".to_string(),
            degree_type: "Bachelor".to_string(),
            field_of_study: "Mathematics".to_string(),
            start_year: "1832".to_string(),
            end_year: "1836".to_string(),
            gpa: Some("3.9".to_string()),
        }],
    }
}

pub(super) fn document(locator: &str, name: &str) -> DocumentReference {
    DocumentReference {
        id: format!("doc-{name}"),
        name: name.to_string(),
        locator: locator.to_string(),
        document_type: "Diploma".to_string(),
        content_type: Some("application/pdf".to_string()),
        size: 4,
        upload_date: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
    }
}

pub(super) fn pdf(name: &str) -> UploadedFile {
    UploadedFile {
        name: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        document_type: "Diploma".to_string(),
        bytes: b"%PDF-1.7 test".to_vec(),
    }
}

/// A draft that passes every section contract, with the given documents.
pub(super) fn complete_draft(files: Vec<DocumentReference>) -> DraftApplication {
    DraftApplication {
        personal_info: personal_info(),
        education: education(),
        documents: DocumentSet { files },
        selected_package: PackageTier::EssentialDocument.selection(),
        review_data: ReviewConsent {
            terms_accepted: true,
            payment_id: None,
        },
    }
}

/// Mailer that records every attempt and fails for configured recipients.
#[derive(Default)]
pub(super) struct RecordingMailer {
    delivered: Mutex<Vec<OutboundEmail>>,
    attempted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub(super) fn failing_for(address: &str) -> Self {
        let mailer = Self::default();
        mailer.fail_for(address);
        mailer
    }

    pub(super) fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub(super) fn delivered(&self) -> Vec<OutboundEmail> {
        self.delivered.lock().unwrap().clone()
    }

    pub(super) fn delivered_to(&self, address: &str) -> Vec<OutboundEmail> {
        self.delivered()
            .into_iter()
            .filter(|email| email.to == address)
            .collect()
    }

    pub(super) fn attempted(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }

    /// The six-digit code from the most recent verification message to `address`.
    pub(super) fn last_code_for(&self, address: &str) -> Option<String> {
        self.delivered_to(address)
            .iter()
            .rev()
            .find(|email| email.subject == "Your Verification Code")
            .and_then(|email| extract_code(&email.text))
    }
}

pub(super) fn extract_code(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() == 6)
        .map(str::to_string)
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), TransportError> {
        self.attempted.lock().unwrap().push(email.to.clone());
        if self.failing.lock().unwrap().contains(&email.to) {
            return Err(TransportError::Delivery("550 mailbox unavailable".to_string()));
        }
        self.delivered.lock().unwrap().push(email);
        Ok(())
    }
}

/// Processor holding payments in memory. New intents start as `requires_payment_method`.
#[derive(Default)]
pub(super) struct FakeProcessor {
    payments: Mutex<HashMap<String, PaymentRecord>>,
    created: Mutex<Vec<(i64, String)>>,
    sequence: AtomicUsize,
}

impl FakeProcessor {
    pub(super) fn with_payment(reference: &str, status: &str, amount: i64) -> Self {
        let processor = Self::default();
        processor.set_payment(reference, status, amount);
        processor
    }

    pub(super) fn set_payment(&self, reference: &str, status: &str, amount: i64) {
        self.payments.lock().unwrap().insert(
            reference.to_string(),
            PaymentRecord {
                reference: reference.to_string(),
                status: PaymentStatus::new(status),
                amount,
                currency: "usd".to_string(),
            },
        );
    }

    pub(super) fn set_status(&self, reference: &str, status: &str) {
        if let Some(record) = self.payments.lock().unwrap().get_mut(reference) {
            record.status = PaymentStatus::new(status);
        }
    }

    pub(super) fn created(&self) -> Vec<(i64, String)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ProcessorError> {
        let index = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("pi_test_{index}");
        self.created
            .lock()
            .unwrap()
            .push((amount_minor, currency.to_string()));
        self.set_payment(&reference, PaymentStatus::REQUIRES_PAYMENT_METHOD, amount_minor);
        Ok(PaymentIntent {
            client_secret: format!("{reference}_secret_test"),
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

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub(super) struct FlakyDocumentStore {
    pub(super) inner: MemoryDocumentStore,
    fail_puts: AtomicBool,
}

impl FlakyDocumentStore {
    pub(super) fn fail_uploads(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn put(&self, key: &str, file: &UploadedFile) -> Result<StoredObject, StorageError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("bucket unavailable".to_string()));
        }
        self.inner.put(key, file).await
    }

    async fn resolve(&self, locator: &str) -> Result<ResolvedDocument, StorageError> {
        self.inner.resolve(locator).await
    }
}

#[derive(Default)]
pub(super) struct RecordingNavigator {
    returns: AtomicUsize,
}

impl RecordingNavigator {
    pub(super) fn returns(&self) -> usize {
        self.returns.load(Ordering::SeqCst)
    }
}

impl OriginNavigator for RecordingNavigator {
    fn return_to_origin(&self) {
        self.returns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fully wired services over fakes, with handles to every fake.
pub(super) struct Harness {
    pub(super) services: Arc<IntakeServices>,
    pub(super) mailer: Arc<RecordingMailer>,
    pub(super) processor: Arc<FakeProcessor>,
    pub(super) documents: Arc<FlakyDocumentStore>,
    pub(super) challenges: Arc<MemoryChallengeStore>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn harness() -> Harness {
    harness_with(FakeProcessor::default(), RecordingMailer::default(), &["482913"])
}

pub(super) fn harness_with(
    processor: FakeProcessor,
    mailer: RecordingMailer,
    codes: &[&str],
) -> Harness {
    let mailer = Arc::new(mailer);
    let processor = Arc::new(processor);
    let documents = Arc::new(FlakyDocumentStore::default());
    let challenges = Arc::new(MemoryChallengeStore::default());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
    ));

    let mut components = IntakeComponents::new(
        challenges.clone(),
        documents.clone(),
        processor.clone(),
        mailer.clone(),
        sender(),
    );
    components.clock = clock.clone();
    components.code_generator = Arc::new(FixedCodeGenerator::new(codes.iter().copied()));

    Harness {
        services: Arc::new(IntakeServices::new(components)),
        mailer,
        processor,
        documents,
        challenges,
        clock,
    }
}

pub(super) async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let body = serde_json::from_slice(&bytes).expect("json body");
    (status, body)
}
