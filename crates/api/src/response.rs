//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use collector_core::SessionInfo;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use worker::SchedulerState;

/// Accepted collect request.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectResponse {
    /// Continuity token for the next request
    pub cache: String,
    #[serde(flatten)]
    pub session: SessionInfo,
}

/// Returned to crawlers instead of an error.
#[derive(Debug, Serialize, Deserialize)]
pub struct BotResponse {
    pub beep: String,
}

impl Default for BotResponse {
    fn default() -> Self {
        Self {
            beep: "boop".to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage_connected: bool,
    pub scheduler_healthy: bool,
    pub scheduler_state: SchedulerState,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// API error carrying a stable machine code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<collector_core::Error> for ApiError {
    fn from(err: collector_core::Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(code = err.error_code(), error = %err, "Collect request failed");
        } else {
            warn!(code = err.error_code(), error = %err, "Collect request rejected");
        }

        // Store internals stay in the logs
        let message = match &err {
            collector_core::Error::TransientStore(_) => "storage temporarily unavailable".into(),
            collector_core::Error::Internal(_) => "internal error".into(),
            other => other.to_string(),
        };

        ApiError::with_code(status, err.error_code(), message)
    }
}
