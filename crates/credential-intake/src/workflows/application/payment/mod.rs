//! Charge intents and payment confirmation against an external processor.

mod stripe;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::catalog::PackageTier;
use super::domain::PaymentRecord;

pub use stripe::StripeProcessor;

pub const DEFAULT_CURRENCY: &str = "usd";

/// A created intent. Only `client_secret` ever leaves the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub reference: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ProcessorError>;

    /// Authoritative, current state of a charge.
    async fn retrieve(&self, reference: &str) -> Result<PaymentRecord, ProcessorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("processor rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("processor unreachable: {0}")]
    Transport(String),
    #[error("unexpected processor response: {0}")]
    Decode(String),
    #[error("invalid payment reference '{0}'")]
    InvalidReference(String),
}

/// Where the charged amount comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PricingPolicy {
    /// Catalog price when a package id is given (a client amount must then agree);
    /// otherwise the client amount.
    #[default]
    CatalogOrClient,
    /// A package id is mandatory; client amounts are only cross-checked.
    CatalogOnly,
    /// The client amount is charged as submitted.
    ClientAmount,
}

impl PricingPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "catalog-or-client" => Some(Self::CatalogOrClient),
            "catalog-only" => Some(Self::CatalogOnly),
            "client-amount" => Some(Self::ClientAmount),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::CatalogOrClient => "catalog-or-client",
            Self::CatalogOnly => "catalog-only",
            Self::ClientAmount => "client-amount",
        }
    }
}

/// Body of an intent request. `amount` stays untyped so non-numeric input can be
/// rejected with a client error rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChargeRequest {
    pub amount: Option<Value>,
    pub package_id: Option<String>,
}

/// Opaque client-side token used to complete the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationToken(pub String);

impl AuthorizationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Invalid amount provided.")]
    InvalidAmount,
    #[error("Unknown package '{0}'.")]
    UnknownPackage(String),
    #[error("A package selection is required.")]
    MissingPackage,
    #[error("Amount {submitted} does not match the package price {expected}.")]
    AmountMismatch { expected: i64, submitted: i64 },
    #[error("Missing payment reference.")]
    MissingReference,
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

impl PaymentError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PaymentError::Processor(_))
    }
}

/// Major units to minor units, rounding half up. Only positive, finite amounts of at
/// least one minor unit are accepted.
pub fn to_minor_units(major: f64) -> Result<i64, PaymentError> {
    if !major.is_finite() || major <= 0.0 {
        return Err(PaymentError::InvalidAmount);
    }
    let minor = (major * 100.0 + 0.5).floor();
    if minor < 1.0 || minor >= i64::MAX as f64 {
        return Err(PaymentError::InvalidAmount);
    }
    Ok(minor as i64)
}

fn amount_from_value(value: &Value) -> Result<i64, PaymentError> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or(PaymentError::InvalidAmount)
            .and_then(to_minor_units),
        _ => Err(PaymentError::InvalidAmount),
    }
}

pub struct PaymentAuthorization {
    processor: Arc<dyn PaymentProcessor>,
    currency: String,
    policy: PricingPolicy,
}

impl PaymentAuthorization {
    pub fn new(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            processor,
            currency: DEFAULT_CURRENCY.to_string(),
            policy: PricingPolicy::default(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into().to_ascii_lowercase();
        self
    }

    pub fn with_policy(mut self, policy: PricingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PricingPolicy {
        self.policy
    }

    /// Charge a major-unit amount as submitted.
    pub async fn create_intent(&self, major: f64) -> Result<AuthorizationToken, PaymentError> {
        let minor = to_minor_units(major)?;
        self.open(minor).await
    }

    /// Charge according to the configured [`PricingPolicy`].
    pub async fn create_intent_for(
        &self,
        request: &ChargeRequest,
    ) -> Result<AuthorizationToken, PaymentError> {
        let minor = self.resolve_amount(request)?;
        self.open(minor).await
    }

    pub fn resolve_amount(&self, request: &ChargeRequest) -> Result<i64, PaymentError> {
        let package = request
            .package_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let submitted = match &request.amount {
            None | Some(Value::Null) => None,
            Some(value) => Some(amount_from_value(value)?),
        };

        let catalog_price = |id: &str| -> Result<i64, PaymentError> {
            let tier =
                PackageTier::from_id(id).ok_or_else(|| PaymentError::UnknownPackage(id.to_string()))?;
            let expected = tier.price_minor() as i64;
            match submitted {
                Some(amount) if amount != expected => Err(PaymentError::AmountMismatch {
                    expected,
                    submitted: amount,
                }),
                _ => Ok(expected),
            }
        };

        match (self.policy, package) {
            (PricingPolicy::ClientAmount, _) => submitted.ok_or(PaymentError::InvalidAmount),
            (PricingPolicy::CatalogOnly, None) => Err(PaymentError::MissingPackage),
            (PricingPolicy::CatalogOnly, Some(id)) | (PricingPolicy::CatalogOrClient, Some(id)) => {
                catalog_price(id)
            }
            (PricingPolicy::CatalogOrClient, None) => submitted.ok_or(PaymentError::InvalidAmount),
        }
    }

    async fn open(&self, minor: i64) -> Result<AuthorizationToken, PaymentError> {
        let intent = self.processor.create_intent(minor, &self.currency).await?;
        info!(
            payment_reference = %intent.reference,
            amount = intent.amount,
            currency = %intent.currency,
            "payment intent created"
        );
        Ok(AuthorizationToken(intent.client_secret))
    }

    /// Current processor status for `reference`, returned verbatim.
    pub async fn confirm(&self, reference: &str) -> Result<PaymentRecord, PaymentError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PaymentError::MissingReference);
        }
        let record = self.processor.retrieve(reference).await?;
        debug!(payment_reference = %record.reference, status = %record.status, "payment status retrieved");
        Ok(record)
    }
}
