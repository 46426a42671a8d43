//! API routes.

pub mod exposure;
pub mod health;

use crate::state::AppState;
use axum::Router;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(exposure::routes())
        .merge(health::routes())
        .with_state(state)
}
