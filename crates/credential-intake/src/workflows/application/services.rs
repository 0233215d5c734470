use std::sync::Arc;

use chrono::Duration;

use super::documents::{
    BucketDocumentStore, DocumentInventory, DocumentIntake, DocumentStore, LocalDocumentStore,
    MemoryDocumentStore, UploadPolicy,
};
use super::finalize::FinalizationOrchestrator;
use super::notifications::{LogMailer, Mailer, NotificationDispatcher, SenderIdentity, SmtpMailer};
use super::payment::{PaymentAuthorization, PaymentProcessor, PricingPolicy, StripeProcessor};
use super::verification::{
    ChallengeStore, Clock, CodeGenerator, MemoryChallengeStore, RandomCodeGenerator,
    RestChallengeStore, SystemClock, VerificationGate, DEFAULT_TTL_MINUTES,
};
use crate::config::{
    AppConfig, ChallengeStoreConfig, MailTransportConfig, StorageBackendConfig, StorageConfig,
};
use crate::error::AppError;

/// Adapters the intake services are assembled from.
pub struct IntakeComponents {
    pub challenge_store: Arc<dyn ChallengeStore>,
    pub document_store: Arc<dyn DocumentStore>,
    pub processor: Arc<dyn PaymentProcessor>,
    pub mailer: Arc<dyn Mailer>,
    pub sender: SenderIdentity,
    pub currency: String,
    pub pricing_policy: PricingPolicy,
    pub upload_policy: UploadPolicy,
    pub verification_ttl: Duration,
    pub clock: Arc<dyn Clock>,
    pub code_generator: Arc<dyn CodeGenerator>,
}

impl IntakeComponents {
    /// Defaults for everything except the four external capabilities.
    pub fn new(
        challenge_store: Arc<dyn ChallengeStore>,
        document_store: Arc<dyn DocumentStore>,
        processor: Arc<dyn PaymentProcessor>,
        mailer: Arc<dyn Mailer>,
        sender: SenderIdentity,
    ) -> Self {
        Self {
            challenge_store,
            document_store,
            processor,
            mailer,
            sender,
            currency: super::payment::DEFAULT_CURRENCY.to_string(),
            pricing_policy: PricingPolicy::default(),
            upload_policy: UploadPolicy::default(),
            verification_ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
            clock: Arc::new(SystemClock),
            code_generator: Arc::new(RandomCodeGenerator),
        }
    }

    /// Production adapters selected by configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let mailer: Arc<dyn Mailer> = match &config.mail.transport {
            MailTransportConfig::Smtp(settings) => Arc::new(SmtpMailer::from_settings(settings)?),
            MailTransportConfig::Log => Arc::new(LogMailer),
        };

        let challenge_store: Arc<dyn ChallengeStore> = match &config.verification.store {
            ChallengeStoreConfig::Memory => Arc::new(MemoryChallengeStore::default()),
            ChallengeStoreConfig::Rest { url, api_key } => {
                Arc::new(RestChallengeStore::new(url, api_key.expose())?)
            }
        };

        let processor = Arc::new(StripeProcessor::new(
            &config.payments.api_base,
            config.payments.secret_key.expose(),
        )?);

        let mut components = Self::new(
            challenge_store,
            document_store_from_config(&config.storage)?,
            processor,
            mailer,
            SenderIdentity {
                from_address: config.mail.from_address.clone(),
                admin_address: config.mail.admin_address.clone(),
                organization: config.mail.organization.clone(),
            },
        );
        components.currency = config.payments.currency.clone();
        components.pricing_policy = config.payments.pricing_policy;
        components.verification_ttl = Duration::minutes(config.verification.ttl_minutes);
        Ok(components)
    }
}

fn document_store_from_config(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    Ok(match &config.backend {
        StorageBackendConfig::Local { root } => Arc::new(LocalDocumentStore::new(root.clone())),
        StorageBackendConfig::Bucket(bucket) => Arc::new(BucketDocumentStore::new(
            &bucket.url,
            bucket.service_key.expose(),
            &bucket.bucket,
            bucket.resolution.clone(),
        )?),
        StorageBackendConfig::Memory => Arc::new(MemoryDocumentStore::default()),
    })
}

/// Listing/deletion view of the configured backend, for orphan reconciliation.
pub fn document_inventory_from_config(
    config: &StorageConfig,
) -> Result<Arc<dyn DocumentInventory>, AppError> {
    Ok(match &config.backend {
        StorageBackendConfig::Local { root } => Arc::new(LocalDocumentStore::new(root.clone())),
        StorageBackendConfig::Bucket(bucket) => Arc::new(BucketDocumentStore::new(
            &bucket.url,
            bucket.service_key.expose(),
            &bucket.bucket,
            bucket.resolution.clone(),
        )?),
        StorageBackendConfig::Memory => Arc::new(MemoryDocumentStore::default()),
    })
}

/// Explicitly constructed server-side services shared by the router and the orchestrator.
pub struct IntakeServices {
    pub verification: VerificationGate,
    pub documents: Arc<DocumentIntake>,
    pub payments: Arc<PaymentAuthorization>,
    pub notifier: Arc<NotificationDispatcher>,
    pub finalizer: FinalizationOrchestrator,
}

impl IntakeServices {
    pub fn new(components: IntakeComponents) -> Self {
        let notifier = Arc::new(NotificationDispatcher::new(
            components.mailer,
            components.sender,
        ));
        let verification = VerificationGate::new(components.challenge_store, notifier.clone())
            .with_clock(components.clock)
            .with_generator(components.code_generator)
            .with_ttl(components.verification_ttl);
        let documents = Arc::new(DocumentIntake::new(
            components.document_store,
            components.upload_policy,
        ));
        let payments = Arc::new(
            PaymentAuthorization::new(components.processor)
                .with_currency(components.currency)
                .with_policy(components.pricing_policy),
        );
        let finalizer =
            FinalizationOrchestrator::new(payments.clone(), documents.clone(), notifier.clone());

        Self {
            verification,
            documents,
            payments,
            notifier,
            finalizer,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self::new(IntakeComponents::from_config(config)?))
    }
}
