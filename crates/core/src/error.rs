//! Centralized error types for the exposure workspace.

use thiserror::Error;

/// Top-level error enum. Variants map to subsystems.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExposureError {
    /// Upstream byte source failed (HTTP, filesystem).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Raster is malformed or uses a layout we do not decode.
    #[error("Raster format error: {0}")]
    Format(String),

    #[error("Location outside raster coverage: {0}")]
    OutOfCoverage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ExposureResult<T> = Result<T, ExposureError>;
