//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::dto::{HealthResponse, RasterInfo};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// The raster is opened before the server binds, so a running server is
/// always healthy.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        raster: RasterInfo::new(&state.raster, state.engine.metadata()),
    })
}
