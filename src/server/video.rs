//! Composite video endpoint
//!
//! Each request gets its own [`StreamPublisher`](crate::publisher::StreamPublisher)
//! task feeding a one-slot channel; the response body drains the channel. A
//! slow viewer therefore backpressures only its own publisher.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::info;

use super::listener::ServerState;
use crate::publisher::STREAM_CONTENT_TYPE;

/// GET /video: multipart JPEG stream of the grid
pub(super) async fn video_feed(State(state): State<Arc<ServerState>>) -> Response {
    if state.cancel.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let (tx, rx) = mpsc::channel::<Bytes>(1);
    let viewer_id = state.next_session_id();
    let mut publisher = state.publisher(viewer_id);
    let cancel = state.cancel.clone();
    let metrics = Arc::clone(&state.metrics);

    metrics.viewer_opened();
    info!(viewer_id = viewer_id, "Viewer connected");

    tokio::spawn(async move {
        let stats = publisher.run(tx, cancel).await;
        metrics.viewer_closed();
        info!(
            viewer_id = viewer_id,
            frames = stats.frames_sent,
            failures = stats.compositor_failures,
            reason = ?stats.exit_reason,
            "Viewer disconnected"
        );
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|part| (Ok::<_, Infallible>(part), rx))
    });

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
