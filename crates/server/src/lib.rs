//! HTTP API for the wind exposure service.
//!
//! `GET /exposure` assesses a site, `GET /health` reports liveness and the
//! raster in use.

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{ExposureServer, ServerConfig};
pub use state::AppState;
