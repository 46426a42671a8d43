//! Wind exposure endpoint.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::dto::{ExposureQuery, ExposureResponse};
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/exposure", get(get_exposure))
}

/// Roughness and exposure category in eight directions around a site.
async fn get_exposure(
    State(state): State<AppState>,
    query: Result<Query<ExposureQuery>, QueryRejection>,
) -> Result<Json<ExposureResponse>, ApiError> {
    let Query(query) = query?;
    let location = query.location();

    let report = tokio::time::timeout(state.request_timeout, state.engine.assess(location))
        .await
        .map_err(|_| ApiError::Timeout(state.request_timeout.as_secs()))??;

    Ok(Json(ExposureResponse::from_report(report, query.detail)))
}
