//! WebSocket ingest endpoint
//!
//! Sources send binary JPEG frames and get control directives back as text.
//! Controllers send JSON control updates and get the per-client summary back.
//! Both kinds of peer use the same endpoint; a connection only becomes a grid
//! client once it sends its first frame.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::listener::ServerState;
use crate::ingest::{IngestMessage, IngestReply, IngestSession, SessionPhase};

/// Query parameters accepted on `/ws`
#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    /// Registry key to use instead of the peer IP
    pub id: Option<String>,
}

/// WebSocket upgrade handler
pub(super) async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<IngestParams>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    if state.cancel.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let Ok(permit) = state.try_admit() else {
        warn!(peer = %peer_addr, "Connection rejected: limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.on_upgrade(move |socket| async move {
        let _permit = permit;
        handle_ingest(socket, peer_addr, params.id, state).await;
    })
}

/// Drive one ingest connection until either side closes it
async fn handle_ingest(
    socket: WebSocket,
    peer_addr: SocketAddr,
    assigned_id: Option<String>,
    state: Arc<ServerState>,
) {
    let session_id = state.next_session_id();
    let mut session = IngestSession::new(session_id, peer_addr, assigned_id, state.ingest_context());

    state.metrics.ingest_opened();
    info!(
        session_id = session_id,
        peer = %peer_addr,
        client = %session.client_id,
        "Ingest connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        let msg = tokio::select! {
            _ = state.cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            msg = ws_rx.next() => msg,
        };

        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(session_id = session_id, error = %e, "Ingest receive error");
                break;
            }
            None => break,
        };

        match session.handle(into_ingest_message(msg)).await {
            Some(IngestReply::Text(text)) => {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Some(IngestReply::Close) => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            None => {}
        }

        if session.phase() == SessionPhase::Closed {
            break;
        }
    }

    state.metrics.ingest_closed();
    info!(
        session_id = session_id,
        client = %session.client_id,
        frames = session.frames_received(),
        dropped = session.dropped_messages(),
        "Ingest connection closed"
    );
}

fn into_ingest_message(msg: Message) -> IngestMessage {
    match msg {
        Message::Binary(data) => IngestMessage::Binary(data),
        Message::Text(text) => IngestMessage::Text(text.as_str().to_owned()),
        Message::Close(_) => IngestMessage::Close,
        Message::Ping(_) => IngestMessage::Other("ping"),
        Message::Pong(_) => IngestMessage::Other("pong"),
    }
}
