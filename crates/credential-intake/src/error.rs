use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::application::documents::StorageError;
use crate::workflows::application::notifications::TransportError;
use crate::workflows::application::payment::ProcessorError;
use crate::workflows::application::verification::ChallengeStoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Failures that stop the process from starting or an operator command from completing.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Mail(TransportError),
    Payments(ProcessorError),
    Storage(StorageError),
    Challenges(ChallengeStoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Mail(err) => write!(f, "mail transport error: {}", err),
            AppError::Payments(err) => write!(f, "payment processor error: {}", err),
            AppError::Storage(err) => write!(f, "document storage error: {}", err),
            AppError::Challenges(err) => write!(f, "challenge store error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Mail(err) => Some(err),
            AppError::Payments(err) => Some(err),
            AppError::Storage(err) => Some(err),
            AppError::Challenges(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<TransportError> for AppError {
    fn from(value: TransportError) -> Self {
        Self::Mail(value)
    }
}

impl From<ProcessorError> for AppError {
    fn from(value: ProcessorError) -> Self {
        Self::Payments(value)
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<ChallengeStoreError> for AppError {
    fn from(value: ChallengeStoreError) -> Self {
        Self::Challenges(value)
    }
}
