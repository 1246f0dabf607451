// HTTP + WebSocket routes: read-only feed of the latest snapshot

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::models::{ChipInfo, MetricsSnapshot};
use crate::worker::LatestSnapshot;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) snapshot_tx: broadcast::Sender<Arc<MetricsSnapshot>>,
    pub(crate) latest: LatestSnapshot,
    pub(crate) chip_info: Arc<ChipInfo>,
    pub(crate) ws_connections: Arc<AtomicUsize>,
}

pub fn app(
    snapshot_tx: broadcast::Sender<Arc<MetricsSnapshot>>,
    latest: LatestSnapshot,
    chip_info: Arc<ChipInfo>,
    ws_connections: Arc<AtomicUsize>,
) -> Router {
    let state = AppState {
        snapshot_tx,
        latest,
        chip_info,
        ws_connections,
    };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/chip", get(http::chip_handler)) // GET /api/chip
        .route("/api/metrics", get(http::metrics_handler)) // GET /api/metrics
        .route("/ws/metrics", get(ws::ws_metrics)) // WS /ws/metrics
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
