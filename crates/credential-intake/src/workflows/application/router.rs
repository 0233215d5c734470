use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::catalog::catalog;
use super::documents::{DocumentUploader, UploadedFile};
use super::finalize::{FinalizationError, FinalizeRequest};
use super::payment::{ChargeRequest, PaymentError, ProcessorError};
use super::services::IntakeServices;
use super::verification::{ChallengeError, VerificationError};

pub const ISSUED_MESSAGE: &str = "Verification code sent successfully.";
pub const VERIFIED_MESSAGE: &str = "Email verified successfully.";
pub const UPLOADED_MESSAGE: &str = "Upload successful";

const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Router exposing verification, upload, payment and finalize endpoints.
pub fn intake_router(services: Arc<IntakeServices>) -> Router {
    let body_limit = services.documents.policy().max_bytes as usize + MULTIPART_OVERHEAD_BYTES;
    Router::new()
        .route("/api/v1/verification", post(issue_handler))
        .route("/api/v1/verification/resend", post(resend_handler))
        .route("/api/v1/verification/verify", post(verify_handler))
        .route("/api/v1/documents", post(upload_handler))
        .route("/api/v1/payments/intents", post(intent_handler))
        .route("/api/v1/applications/finalize", post(finalize_handler))
        .route("/api/v1/packages", get(packages_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(services)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EmailPayload {
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct VerifyPayload {
    email: Option<String>,
    code: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, Json(payload)).into_response()
}

/// Malformed, mistyped or non-JSON bodies are client input errors.
fn rejected_body(rejection: JsonRejection) -> Response {
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

pub(crate) async fn issue_handler(
    State(services): State<Arc<IntakeServices>>,
    payload: Result<Json<EmailPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_body(rejection),
    };
    let email = payload.email.unwrap_or_default();
    match services.verification.issue(&email).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "message": ISSUED_MESSAGE }))).into_response(),
        Err(err) => verification_failure(err),
    }
}

pub(crate) async fn resend_handler(
    State(services): State<Arc<IntakeServices>>,
    payload: Result<Json<EmailPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_body(rejection),
    };
    let email = payload.email.unwrap_or_default();
    match services.verification.resend(&email).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "message": ISSUED_MESSAGE }))).into_response(),
        Err(err) => verification_failure(err),
    }
}

fn verification_failure(err: VerificationError) -> Response {
    match err {
        VerificationError::MissingEmail => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        other => {
            error!(error = %other, "verification code not issued");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send verification email.",
            )
        }
    }
}

pub(crate) async fn verify_handler(
    State(services): State<Arc<IntakeServices>>,
    payload: Result<Json<VerifyPayload>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_body(rejection),
    };
    let email = payload.email.unwrap_or_default();
    let code = payload.code.unwrap_or_default();
    if email.trim().is_empty() || code.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email and code are required.");
    }

    match services.verification.verify(&email, &code).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "message": VERIFIED_MESSAGE, "verified": true })),
        )
            .into_response(),
        Err(err @ ChallengeError::Store(_)) => {
            error!(error = %err, "challenge store failure during verify");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.user_message())
        }
        Err(err) => error_response(StatusCode::BAD_REQUEST, err.user_message()),
    }
}

pub(crate) async fn upload_handler(
    State(services): State<Arc<IntakeServices>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<UploadedFile> = None;
    let mut document_type = String::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return error_response(err.status(), err.body_text()),
        };
        match field.name() {
            Some("document") => {
                let name = field.file_name().unwrap_or("document").to_string();
                let content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some(UploadedFile {
                            name,
                            content_type,
                            document_type: String::new(),
                            bytes: bytes.to_vec(),
                        })
                    }
                    Err(err) => return error_response(err.status(), err.body_text()),
                }
            }
            Some("documentType") | Some("type") => {
                document_type = match field.text().await {
                    Ok(text) => text,
                    Err(err) => return error_response(err.status(), err.body_text()),
                };
            }
            _ => {}
        }
    }

    let Some(mut file) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided.");
    };
    file.document_type = document_type;

    match services.documents.upload(&file).await {
        Ok(stored) => (
            StatusCode::OK,
            Json(json!({
                "message": UPLOADED_MESSAGE,
                "locator": stored.locator,
                "path": stored.locator,
                "name": file.name,
                "size": stored.size,
                "contentType": stored.content_type,
            })),
        )
            .into_response(),
        Err(err) if err.is_client_error() => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            error!(error = %err, file = %file.name, "document upload failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong during the upload.",
            )
        }
    }
}

pub(crate) async fn intent_handler(
    State(services): State<Arc<IntakeServices>>,
    request: Result<Json<ChargeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected_body(rejection),
    };
    match services.payments.create_intent_for(&request).await {
        Ok(token) => (
            StatusCode::OK,
            Json(json!({ "authorizationToken": token })),
        )
            .into_response(),
        Err(err) if err.is_client_error() => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        Err(err) => {
            error!(error = %err, "payment intent creation failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal Server Error: {err}"),
            )
        }
    }
}

pub(crate) async fn finalize_handler(
    State(services): State<Arc<IntakeServices>>,
    request: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejected_body(rejection),
    };
    match services.finalizer.finalize(request).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => finalization_failure(err),
    }
}

fn finalization_failure(err: FinalizationError) -> Response {
    match &err {
        FinalizationError::MissingField | FinalizationError::MalformedDraft(_) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        FinalizationError::PaymentNotSucceeded { status } => {
            let payload = json!({ "error": err.to_string(), "status": status });
            (StatusCode::PAYMENT_REQUIRED, Json(payload)).into_response()
        }
        FinalizationError::PaymentLookup(lookup) if is_unknown_payment(lookup) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        FinalizationError::PaymentLookup(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        FinalizationError::AdminNotification {
            payment_reference, ..
        } => {
            let payload = json!({
                "error": err.to_string(),
                "paymentReference": payment_reference,
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn is_unknown_payment(err: &PaymentError) -> bool {
    match err {
        PaymentError::Processor(ProcessorError::InvalidReference(_)) => true,
        PaymentError::Processor(ProcessorError::Rejected { status, .. }) => *status == 404,
        PaymentError::Processor(_) => false,
        _ => err.is_client_error(),
    }
}

pub(crate) async fn packages_handler() -> Response {
    (StatusCode::OK, Json(catalog())).into_response()
}
