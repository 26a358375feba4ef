//! Response bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use telemetry::{ComponentHealthReport, MetricsSnapshot};

use crate::state::LedgerStatus;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: Vec<ComponentHealthReport>,
}

/// `/status` response: ledger aggregates plus in-process counters.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub ledger: LedgerStatus,
    pub metrics: MetricsSnapshot,
    pub timestamp: i64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error carrying the domain error code.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse {
                error: msg.into(),
                code: code.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<ingest_core::Error> for ApiError {
    fn from(err: ingest_core::Error) -> Self {
        let status = if err.is_transient() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let code = err.error_code().unwrap_or("INTERNAL");
        ApiError::with_code(status, code, err.to_string())
    }
}
