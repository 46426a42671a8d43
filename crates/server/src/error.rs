//! API error types and handling.

use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use exposure_core::ExposureError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing, malformed or out-of-range query parameters.
    #[error("{0}")]
    InvalidParameters(String),

    /// The site is not covered by the land cover raster.
    #[error("{0}")]
    OutOfCoverage(String),

    /// The raster source could not be read.
    #[error("{0}")]
    Upstream(String),

    /// The assessment did not finish within the request timeout.
    #[error("assessment timed out after {0} s")]
    Timeout(u64),

    #[error("{0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidParameters(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::OutOfCoverage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidParameters(_) => "INVALID_PARAMETERS",
            ApiError::OutOfCoverage(_) => "OUT_OF_COVERAGE",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Timeout(_) => "TIMEOUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ExposureError> for ApiError {
    fn from(err: ExposureError) -> Self {
        match err {
            ExposureError::InvalidInput(msg) => ApiError::InvalidParameters(msg),
            ExposureError::OutOfCoverage(msg) => ApiError::OutOfCoverage(msg),
            ExposureError::Provider(msg) => ApiError::Upstream(msg),
            err => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidParameters(rejection.body_text())
    }
}
