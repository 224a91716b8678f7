//! HTTP server
//!
//! - `WS /ws`: frame ingest and control updates
//! - `GET /video`: multipart JPEG stream of the composite grid
//! - `GET /api/status`: server counters and per-client summaries

pub mod config;
pub mod listener;
mod video;
mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;

pub use config::{ConfigError, ServerConfig, DEFAULT_EXPECTED_CLIENTS, DEFAULT_PORT};
pub use listener::GridServer;
pub use ws::IngestParams;

use crate::stats::summarize;
use listener::ServerState;

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/video", get(video::video_feed))
        .route("/api/status", get(api_status))
        .with_state(state)
}

/// GET /api/status
async fn api_status(State(state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    let clients = state.registry.all_stats().await;

    Json(serde_json::json!({
        "server": state.metrics.snapshot(),
        "clients": summarize(&clients),
        "pool": {
            "size": state.pool.size(),
            "in_flight": state.pool.in_flight(),
        },
        "control_policy": format!("{:?}", state.relay.policy()),
    }))
}
