//! HTTP error responses

use crate::error::RemovalError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

impl RemovalError {
    /// HTTP status reported for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO_ERROR",
            Self::Decode(_) => "IMAGE_DECODE_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::NonFiniteOutput { .. } => "NON_FINITE_OUTPUT",
            Self::Inference(_) => "INFERENCE_ERROR",
            Self::Model(_) => "MODEL_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            Self::InvalidConfig(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Error returned by HTTP handlers, rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, code: &'static str, message: S) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<RemovalError> for ApiError {
    fn from(err: RemovalError) -> Self {
        Self::new(err.status_code(), err.error_code(), err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        let status = err.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "PAYLOAD_TOO_LARGE"
        } else {
            "INVALID_MULTIPART"
        };
        Self::new(status, code, err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "Request failed: {} ({})", self.message, self.status);
        } else {
            tracing::warn!(code = self.code, "Request rejected: {} ({})", self.message, self.status);
        }

        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });

        (self.status, Json(body)).into_response()
    }
}
