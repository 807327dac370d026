//! JSON error bodies for the API.
//!
//! Client mistakes get `{"error": "<Code>", "message": "<detail>"}` with a
//! 4xx status. Anything the server is at fault for is logged and answered
//! with a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::download::DownloadError;
use crate::exchange::ExchangeError;
use crate::upload::UploadError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: code.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal",
        "internal error",
    )
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        match self {
            ExchangeError::Protocol(msg) => {
                error_response(StatusCode::BAD_REQUEST, "ProtocolError", msg)
            }
            ExchangeError::InvalidRequest(msg) => {
                error_response(StatusCode::BAD_REQUEST, "InvalidRequest", msg)
            }
            ExchangeError::NotFound => {
                error_response(StatusCode::NOT_FOUND, "NotFound", "bucket not found")
            }
            ExchangeError::Unauthorized => {
                error_response(StatusCode::UNAUTHORIZED, "Unauthorized", "unauthorized")
            }
            e => {
                tracing::error!("credential exchange failed: {}", e);
                internal_error()
            }
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::InvalidUpload(msg) => {
                error_response(StatusCode::BAD_REQUEST, "InvalidUpload", msg)
            }
            UploadError::Plan(e) => {
                error_response(StatusCode::BAD_REQUEST, "InvalidUpload", e.to_string())
            }
            UploadError::UnknownUpload => {
                error_response(StatusCode::NOT_FOUND, "UnknownUpload", "unknown upload")
            }
            e @ UploadError::IncompleteUpload { .. } => {
                error_response(StatusCode::CONFLICT, "IncompleteUpload", e.to_string())
            }
            e @ UploadError::MissingChunk(_) => {
                error_response(StatusCode::CONFLICT, "MissingChunk", e.to_string())
            }
            e @ UploadError::IntegrityMismatch(_) => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "IntegrityMismatch",
                e.to_string(),
            ),
            e => {
                tracing::error!("upload failed: {}", e);
                internal_error()
            }
        }
    }
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        match self {
            DownloadError::NotFound => {
                error_response(StatusCode::NOT_FOUND, "NotFound", "file not found")
            }
            DownloadError::StageViolation { expected, actual } => {
                tracing::debug!(%expected, %actual, "download stage violation");
                error_response(StatusCode::CONFLICT, "StageViolation", "bad stage")
            }
            e @ DownloadError::ShortWrite { .. } => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, "ShortWrite", e.to_string())
            }
            e => {
                tracing::error!("download failed: {}", e);
                internal_error()
            }
        }
    }
}
