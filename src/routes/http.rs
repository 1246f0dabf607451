// GET handlers: version, chip, latest metrics

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/chip: detected SoC and resolved capability limits.
pub(super) async fn chip_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.chip_info.as_ref().clone())
}

/// GET /api/metrics: latest snapshot, 204 before the first sample.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    let latest = state.latest.borrow().clone();
    match latest {
        Some(snapshot) => axum::Json(snapshot.as_ref().clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
