//! Error types and handling for the gateway.
//!
//! This module provides a unified error type [`AppError`] covering request
//! validation and every upstream failure kind, and implements HTTP response
//! conversion with a structured [`ErrorBody`].

use crate::core::error_types::ErrorKind;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Main error type for the application.
///
/// Upstream failures keep their kind all the way to the HTTP boundary; nothing
/// is collapsed into a generic error.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (missing credential, unparsable values)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Client supplied a malformed or out-of-range request
    #[error("Invalid request: {message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// Provider rejected the credential
    #[error("Upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// Provider quota or rate limit exhausted
    #[error("Upstream rate limit exceeded: {0}")]
    UpstreamRateLimit(String),

    /// Provider refused the prompt or the generated content
    #[error("Upstream content policy rejection ({reason}): {message}")]
    UpstreamContentPolicy { reason: String, message: String },

    /// Network failure or timeout talking to the provider
    #[error("Upstream transport error: {message}")]
    UpstreamTransport { message: String, timeout: bool },

    /// Provider answered with something the adapter cannot interpret
    #[error("Malformed upstream response: {0}")]
    UpstreamMalformedResponse(String),

    /// Any other non-success status returned by the provider
    #[error("Upstream provider error (HTTP {status}): {message}")]
    UpstreamProvider { status: u16, message: String },

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Structured error payload returned to callers and emitted as the SSE
/// `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error_kind": "ValidationError",
    "message": "temperature must be between 0.0 and 2.0",
    "field": "temperature"
}))]
pub struct ErrorBody {
    /// Machine-readable error kind
    pub error_kind: String,

    /// Human-readable description
    pub message: String,

    /// Offending request field, for validation errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Provider-supplied reason, for content policy rejections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AppError {
    /// Build a validation error naming the offending field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) => ErrorKind::Config,
            AppError::Validation { .. } => ErrorKind::Validation,
            AppError::UpstreamAuth(_) => ErrorKind::UpstreamAuth,
            AppError::UpstreamRateLimit(_) => ErrorKind::UpstreamRateLimit,
            AppError::UpstreamContentPolicy { .. } => ErrorKind::UpstreamContentPolicy,
            AppError::UpstreamTransport { .. } => ErrorKind::UpstreamTransport,
            AppError::UpstreamMalformedResponse(_) => ErrorKind::UpstreamMalformedResponse,
            AppError::UpstreamProvider { .. } => ErrorKind::UpstreamProvider,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UpstreamRateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamContentPolicy { .. } => StatusCode::BAD_REQUEST,
            AppError::UpstreamTransport { timeout: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            AppError::UpstreamProvider { .. } => StatusCode::BAD_GATEWAY,
            // A rejected credential is a deployment problem, not the caller's.
            AppError::UpstreamAuth(_)
            | AppError::UpstreamMalformedResponse(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let (message, field, reason) = match self {
            AppError::Validation { field, message } => (message.clone(), field.clone(), None),
            AppError::UpstreamContentPolicy { reason, message } => {
                (message.clone(), None, Some(reason.clone()))
            }
            AppError::UpstreamTransport { message, .. } => (message.clone(), None, None),
            AppError::UpstreamProvider { message, .. } => (message.clone(), None, None),
            AppError::UpstreamAuth(msg)
            | AppError::UpstreamRateLimit(msg)
            | AppError::UpstreamMalformedResponse(msg)
            | AppError::Internal(msg) => (msg.clone(), None, None),
            AppError::Config(e) => (e.to_string(), None, None),
        };

        ErrorBody {
            error_kind: self.kind().as_str().to_string(),
            message,
            field,
            reason,
        }
    }

    /// Log the failure at a level matching its kind and count upstream errors.
    pub fn record(&self) {
        let kind = self.kind();
        if kind.is_upstream() {
            if let Some(metrics) = crate::core::metrics::try_get_metrics() {
                metrics
                    .upstream_errors
                    .with_label_values(&[kind.as_str()])
                    .inc();
            }
        }

        match kind {
            ErrorKind::Validation => {
                tracing::debug!(error_kind = %kind, error = %self, "Request rejected")
            }
            ErrorKind::UpstreamMalformedResponse | ErrorKind::Internal | ErrorKind::Config => {
                tracing::error!(error_kind = %kind, error = %self, "Request failed")
            }
            _ => tracing::warn!(error_kind = %kind, error = %self, "Upstream call failed"),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        // Sanitize message for client: avoid leaking internal URLs/IPs from reqwest::Error
        let message = if error.is_timeout() {
            "Upstream request timed out".to_string()
        } else if error.is_connect() {
            "Failed to connect to upstream provider".to_string()
        } else if error.is_body() || error.is_decode() {
            "Failed to read upstream response body".to_string()
        } else {
            "Upstream request failed".to_string()
        };
        tracing::debug!(error = %error, "Upstream transport failure");

        AppError::UpstreamTransport {
            message,
            timeout: error.is_timeout(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.record();
        let status = self.status();
        (status, Json(self.to_body())).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
