use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::workflows::application::documents::{
    DocumentUploader, StoredObject, UploadError, UploadedFile,
};
use crate::workflows::application::domain::DraftApplication;
use crate::workflows::application::finalize::FinalizationError;
use crate::workflows::application::payment::{AuthorizationToken, ChargeRequest};
use crate::workflows::application::services::IntakeServices;
use crate::workflows::application::verification::VerificationError;

/// What the wizard learns from a successful finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationReceipt {
    pub message: String,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub applicant_notified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The server refused the request; the message is meant for the applicant.
    #[error("{0}")]
    Rejected(String),
    #[error("{message}")]
    PaymentNotSucceeded { status: String, message: String },
    #[error("could not reach the intake service: {0}")]
    Transport(String),
    #[error("unexpected response from the intake service: {0}")]
    Decode(String),
}

/// Every server operation the client-side wizard depends on.
#[async_trait]
pub trait IntakeGateway: DocumentUploader {
    async fn request_code(&self, email: &str) -> Result<(), GatewayError>;
    async fn resend_code(&self, email: &str) -> Result<(), GatewayError>;
    async fn verify_code(&self, email: &str, code: &str) -> Result<(), GatewayError>;
    async fn create_intent(
        &self,
        request: &ChargeRequest,
    ) -> Result<AuthorizationToken, GatewayError>;
    async fn finalize(
        &self,
        payment_reference: &str,
        draft: &DraftApplication,
    ) -> Result<FinalizationReceipt, GatewayError>;
}

/// Gateway speaking to the HTTP API.
#[derive(Debug, Clone)]
pub struct HttpIntakeGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIntakeGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<Value, GatewayError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|err| GatewayError::Decode(err.to_string()))?;
    if status.is_success() {
        return Ok(body);
    }

    let message = body
        .get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("request failed")
        .to_string();
    if status == reqwest::StatusCode::PAYMENT_REQUIRED {
        let payment_status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(GatewayError::PaymentNotSucceeded {
            status: payment_status,
            message,
        });
    }
    Err(GatewayError::Rejected(message))
}

#[async_trait]
impl DocumentUploader for HttpIntakeGateway {
    async fn upload(&self, file: &UploadedFile) -> Result<StoredObject, UploadError> {
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|err| UploadError::Rejected(err.to_string()))?;
        }
        let form = Form::new()
            .part("document", part)
            .text("documentType", file.document_type.clone());

        let response = self
            .client
            .post(self.url("/api/v1/documents"))
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;
        let status = response.status();
        let body = read_body(response).await.map_err(|err| match err {
            GatewayError::Rejected(message) if status.is_client_error() => {
                UploadError::Rejected(message)
            }
            other => UploadError::Transport(other.to_string()),
        })?;

        let locator = body
            .get("locator")
            .or_else(|| body.get("path"))
            .and_then(Value::as_str)
            .ok_or_else(|| UploadError::Transport("upload response missing locator".to_string()))?;
        Ok(StoredObject {
            locator: locator.to_string(),
            size: body
                .get("size")
                .and_then(Value::as_u64)
                .unwrap_or(file.bytes.len() as u64),
            content_type: body
                .get("contentType")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl IntakeGateway for HttpIntakeGateway {
    async fn request_code(&self, email: &str) -> Result<(), GatewayError> {
        self.post_json("/api/v1/verification", &json!({ "email": email }))
            .await
            .map(|_| ())
    }

    async fn resend_code(&self, email: &str) -> Result<(), GatewayError> {
        self.post_json("/api/v1/verification/resend", &json!({ "email": email }))
            .await
            .map(|_| ())
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<(), GatewayError> {
        self.post_json(
            "/api/v1/verification/verify",
            &json!({ "email": email, "code": code }),
        )
        .await
        .map(|_| ())
    }

    async fn create_intent(
        &self,
        request: &ChargeRequest,
    ) -> Result<AuthorizationToken, GatewayError> {
        let body = serde_json::to_value(request).map_err(|err| GatewayError::Decode(err.to_string()))?;
        let response = self.post_json("/api/v1/payments/intents", &body).await?;
        response
            .get("authorizationToken")
            .and_then(Value::as_str)
            .map(|token| AuthorizationToken(token.to_string()))
            .ok_or_else(|| GatewayError::Decode("missing authorizationToken".to_string()))
    }

    async fn finalize(
        &self,
        payment_reference: &str,
        draft: &DraftApplication,
    ) -> Result<FinalizationReceipt, GatewayError> {
        let response = self
            .post_json(
                "/api/v1/applications/finalize",
                &json!({ "paymentReference": payment_reference, "draft": draft }),
            )
            .await?;
        serde_json::from_value(response).map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

/// Gateway calling the server-side services in process.
#[derive(Clone)]
pub struct LocalIntakeGateway {
    services: Arc<IntakeServices>,
}

impl LocalIntakeGateway {
    pub fn new(services: Arc<IntakeServices>) -> Self {
        Self { services }
    }
}

fn issue_failure(err: VerificationError) -> GatewayError {
    match err {
        VerificationError::MissingEmail => GatewayError::Rejected(err.to_string()),
        _ => GatewayError::Rejected("Failed to send verification email.".to_string()),
    }
}

#[async_trait]
impl DocumentUploader for LocalIntakeGateway {
    async fn upload(&self, file: &UploadedFile) -> Result<StoredObject, UploadError> {
        self.services.documents.upload(file).await
    }
}

#[async_trait]
impl IntakeGateway for LocalIntakeGateway {
    async fn request_code(&self, email: &str) -> Result<(), GatewayError> {
        self.services
            .verification
            .issue(email)
            .await
            .map(|_| ())
            .map_err(issue_failure)
    }

    async fn resend_code(&self, email: &str) -> Result<(), GatewayError> {
        self.services
            .verification
            .resend(email)
            .await
            .map(|_| ())
            .map_err(issue_failure)
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<(), GatewayError> {
        self.services
            .verification
            .verify(email, code)
            .await
            .map_err(|err| GatewayError::Rejected(err.user_message().to_string()))
    }

    async fn create_intent(
        &self,
        request: &ChargeRequest,
    ) -> Result<AuthorizationToken, GatewayError> {
        self.services
            .payments
            .create_intent_for(request)
            .await
            .map_err(|err| GatewayError::Rejected(err.to_string()))
    }

    async fn finalize(
        &self,
        payment_reference: &str,
        draft: &DraftApplication,
    ) -> Result<FinalizationReceipt, GatewayError> {
        match self
            .services
            .finalizer
            .finalize_draft(payment_reference, draft)
            .await
        {
            Ok(report) => Ok(FinalizationReceipt {
                message: report.message,
                payment_reference: Some(report.payment_reference),
                applicant_notified: report.applicant_notified,
            }),
            Err(FinalizationError::PaymentNotSucceeded { status }) => {
                let message = FinalizationError::PaymentNotSucceeded {
                    status: status.clone(),
                }
                .to_string();
                Err(GatewayError::PaymentNotSucceeded {
                    status: status.to_string(),
                    message,
                })
            }
            Err(err) => Err(GatewayError::Rejected(err.to_string())),
        }
    }
}
