use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Flat failure taxonomy shared by every pipeline stage.
/// Each stage error maps onto exactly one kind; the kind decides the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // Upload validation
    MissingFile,
    UnsupportedType,
    TypeMismatch,
    TooLarge,
    TooManyPages,
    Unreadable,
    StorageFailure,
    // Conversion
    ProviderError,
    InternalError,
    // Scoring
    ConnectivityExhausted,
    ProviderRejected,
    // Parsing
    MalformedResponse,
    // Workspace lookups
    NotFound,
    InvalidPath,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::MissingFile
            | ErrorKind::UnsupportedType
            | ErrorKind::TypeMismatch
            | ErrorKind::TooLarge
            | ErrorKind::TooManyPages
            | ErrorKind::Unreadable
            | ErrorKind::MalformedResponse
            | ErrorKind::InvalidPath => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ProviderError | ErrorKind::ConnectivityExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorKind::StorageFailure | ErrorKind::InternalError | ErrorKind::ProviderRejected => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::MissingFile => "MISSING_FILE",
            ErrorKind::UnsupportedType => "UNSUPPORTED_TYPE",
            ErrorKind::TypeMismatch => "TYPE_MISMATCH",
            ErrorKind::TooLarge => "TOO_LARGE",
            ErrorKind::TooManyPages => "TOO_MANY_PAGES",
            ErrorKind::Unreadable => "UNREADABLE",
            ErrorKind::StorageFailure => "STORAGE_FAILURE",
            ErrorKind::ProviderError => "PROVIDER_ERROR",
            ErrorKind::InternalError => "INTERNAL_ERROR",
            ErrorKind::ConnectivityExhausted => "CONNECTIVITY_EXHAUSTED",
            ErrorKind::ProviderRejected => "PROVIDER_REJECTED",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidPath => "INVALID_PATH",
        }
    }

    /// Kinds whose message may carry internal detail (paths, I/O errors)
    /// that should be logged rather than returned to the client.
    fn is_opaque(self) -> bool {
        matches!(
            self,
            ErrorKind::StorageFailure | ErrorKind::InternalError | ErrorKind::ProviderRejected
        )
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Pipeline { kind: ErrorKind, message: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn pipeline(kind: ErrorKind, message: impl Into<String>) -> Self {
        AppError::Pipeline {
            kind,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Pipeline { kind, message } if kind.is_opaque() => {
                tracing::error!("{}: {message}", kind.code());
                (
                    kind.status(),
                    kind.code(),
                    "Internal server error".to_string(),
                )
            }
            AppError::Pipeline { kind, message } => (kind.status(), kind.code(), message.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
