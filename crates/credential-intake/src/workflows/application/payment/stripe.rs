use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{PaymentIntent, PaymentProcessor, ProcessorError};
use crate::workflows::application::domain::{PaymentRecord, PaymentStatus};

/// Stripe PaymentIntents over the REST API.
#[derive(Debug, Clone)]
pub struct StripeProcessor {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl StripeProcessor {
    pub fn new(api_base: &str, secret_key: &str) -> Result<Self, ProcessorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ProcessorError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn decode(response: reqwest::Response) -> Result<IntentResponse, ProcessorError> {
        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .ok()
                .and_then(|envelope| envelope.error.message.or(envelope.error.kind))
                .unwrap_or(raw);
            return Err(ProcessorError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<IntentResponse>()
            .await
            .map_err(|err| ProcessorError::Decode(err.to_string()))
    }
}

fn valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ProcessorError> {
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount_minor.to_string()),
                ("currency", currency.to_string()),
                ("automatic_payment_methods[enabled]", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|err| ProcessorError::Transport(err.to_string()))?;

        let intent = Self::decode(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| ProcessorError::Decode("intent is missing client_secret".to_string()))?;
        Ok(PaymentIntent {
            reference: intent.id,
            client_secret,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    async fn retrieve(&self, reference: &str) -> Result<PaymentRecord, ProcessorError> {
        if !valid_reference(reference) {
            return Err(ProcessorError::InvalidReference(reference.to_string()));
        }
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{reference}", self.api_base))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| ProcessorError::Transport(err.to_string()))?;

        let intent = Self::decode(response).await?;
        Ok(PaymentRecord {
            reference: intent.id,
            status: PaymentStatus::new(intent.status),
            amount: intent.amount,
            currency: intent.currency,
        })
    }
}
