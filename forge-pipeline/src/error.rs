//! Error types for forge-pipeline
//!
//! [`PipelineError`] is the scan-cycle taxonomy; [`ApiError`] is what the
//! reporting API hands back to HTTP clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures raised while ingesting, scoring, admitting or building
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad raw post; dropped and logged, the cycle continues
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Feed fetch failed; the cycle aborts and is retried next interval
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    /// Materializer error; recorded as build_failed, quota slot retained
    #[error("Materializer failure: {0}")]
    MaterializerFailure(String),

    /// Build requested for a candidate without an admitted record
    #[error("Candidate {0} is not admitted")]
    NotAdmitted(String),

    /// Another builder holds the claim on this admitted candidate
    #[error("Build of {0} is already in progress")]
    BuildInProgress(String),

    /// Ledger read/write failed; no decision can be made safely
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(#[from] forge_common::Error),
}

impl PipelineError {
    /// Must the current scan cycle stop?
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::FeedUnavailable(_) | PipelineError::LedgerUnavailable(_)
        )
    }

    /// Short machine-readable label (scan_cycles.outcome)
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MalformedInput(_) => "malformed_input",
            PipelineError::FeedUnavailable(_) => "feed_unavailable",
            PipelineError::MaterializerFailure(_) => "materializer_failure",
            PipelineError::NotAdmitted(_) => "not_admitted",
            PipelineError::BuildInProgress(_) => "build_in_progress",
            PipelineError::LedgerUnavailable(_) => "ledger_unavailable",
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::LedgerUnavailable(forge_common::Error::Database(err))
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// forge-common error
    #[error("Common error: {0}")]
    Common(#[from] forge_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "LEDGER_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::LedgerUnavailable(e) => ApiError::Common(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
