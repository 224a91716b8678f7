//! Per-connection ingest session
//!
//! Each source connection owns one [`IngestSession`]. It is the only writer
//! of its client's ring buffer in the registry, and it is where control
//! commands stored by viewers get forwarded back to the source.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::message::{IngestMessage, IngestReply, CLOSE_COMMAND};
use crate::control::{parse_control_update, ControlRelay};
use crate::registry::{ClientId, ClientRegistry};
use crate::stats::{summarize, ServerMetrics};

/// Shared state every ingest session works against
#[derive(Clone)]
pub struct IngestContext {
    /// Frame registry
    pub registry: Arc<ClientRegistry>,
    /// Control command store
    pub relay: Arc<ControlRelay>,
    /// Server counters
    pub metrics: Arc<ServerMetrics>,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Receiving messages
    Active,
    /// Close requested by either side
    Closed,
}

/// State for one ingest connection
pub struct IngestSession {
    /// Unique session ID
    pub session_id: u64,
    /// Remote peer address
    pub peer_addr: SocketAddr,
    /// Registry key this connection writes under
    pub client_id: ClientId,
    ctx: IngestContext,
    phase: SessionPhase,
    frames_received: u64,
    dropped_messages: u64,
}

impl IngestSession {
    /// Create a session
    ///
    /// The client id defaults to the peer's IP address when none is assigned.
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        assigned_id: Option<String>,
        ctx: IngestContext,
    ) -> Self {
        let client_id = match assigned_id {
            Some(id) if !id.trim().is_empty() => ClientId::new(id.trim()),
            _ => ClientId::new(peer_addr.ip().to_string()),
        };

        Self {
            session_id,
            peer_addr,
            client_id,
            ctx,
            phase: SessionPhase::Active,
            frames_received: 0,
            dropped_messages: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Frames received on this connection
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Messages dropped on this connection
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }

    /// Handle one inbound message
    ///
    /// Malformed input is logged and dropped; it never closes the session.
    pub async fn handle(&mut self, msg: IngestMessage) -> Option<IngestReply> {
        match msg {
            IngestMessage::Binary(data) => self.on_frame(data, Instant::now()).await,
            IngestMessage::Text(text) => self.on_text(&text).await,
            IngestMessage::Close => {
                self.phase = SessionPhase::Closed;
                None
            }
            IngestMessage::Other(kind) => {
                tracing::trace!(session_id = self.session_id, kind = kind, "Ignoring message");
                None
            }
        }
    }

    /// Store a frame and forward any pending control command
    pub async fn on_frame(&mut self, data: Bytes, received_at: Instant) -> Option<IngestReply> {
        let size = data.len();
        let stats = self.ctx.registry.append(&self.client_id, data, received_at).await;
        self.frames_received += 1;
        self.ctx.metrics.frame_received(size);

        tracing::trace!(
            session_id = self.session_id,
            client = %self.client_id,
            size = size,
            fps = stats.fps,
            "Frame received"
        );

        self.ctx
            .relay
            .take_if_present(&self.client_id)
            .await
            .map(|cmd| IngestReply::Text(cmd.directive()))
    }

    /// Handle a text message: `close`, or a JSON control update
    async fn on_text(&mut self, text: &str) -> Option<IngestReply> {
        if text.trim() == CLOSE_COMMAND {
            tracing::debug!(session_id = self.session_id, "Close requested by peer");
            self.phase = SessionPhase::Closed;
            return Some(IngestReply::Close);
        }

        let update = match parse_control_update(text) {
            Ok(update) => update,
            Err(e) => {
                self.dropped_messages += 1;
                self.ctx.metrics.message_dropped();
                tracing::warn!(
                    session_id = self.session_id,
                    peer = %self.peer_addr,
                    error = %e,
                    "Dropping malformed control message"
                );
                return None;
            }
        };

        let count = self.ctx.relay.merge(update).await;
        self.ctx.metrics.control_updated();
        tracing::debug!(session_id = self.session_id, commands = count, "Control update merged");

        let stats = self.ctx.registry.all_stats().await;
        match serde_json::to_string(&summarize(&stats)) {
            Ok(json) => Some(IngestReply::Text(json)),
            Err(e) => {
                tracing::warn!(session_id = self.session_id, error = %e, "Failed to encode summary");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::control::{ControlCommand, ControlPolicy};

    fn context(policy: ControlPolicy) -> IngestContext {
        IngestContext {
            registry: Arc::new(ClientRegistry::new()),
            relay: Arc::new(ControlRelay::with_policy(policy)),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    fn peer() -> SocketAddr {
        "192.168.1.20:53211".parse().unwrap()
    }

    fn frame() -> IngestMessage {
        IngestMessage::Binary(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]))
    }

    #[test]
    fn test_client_id_from_peer_ip() {
        let session = IngestSession::new(1, peer(), None, context(ControlPolicy::Persist));
        assert_eq!(session.client_id.as_str(), "192.168.1.20");

        let session = IngestSession::new(
            2,
            peer(),
            Some("rover-1".into()),
            context(ControlPolicy::Persist),
        );
        assert_eq!(session.client_id.as_str(), "rover-1");

        let session = IngestSession::new(3, peer(), Some("  ".into()), context(ControlPolicy::Persist));
        assert_eq!(session.client_id.as_str(), "192.168.1.20");
    }

    #[tokio::test]
    async fn test_frame_appends_to_registry() {
        let ctx = context(ControlPolicy::Persist);
        let mut session = IngestSession::new(1, peer(), None, ctx.clone());

        assert!(session.handle(frame()).await.is_none());
        assert!(session.handle(frame()).await.is_none());

        let stats = ctx.registry.client_stats(&session.client_id).await.unwrap();
        assert_eq!(stats.frame_count, 2);
        assert_eq!(session.frames_received(), 2);
        assert_eq!(ctx.metrics.snapshot().frames_received, 2);
    }

    #[tokio::test]
    async fn test_fps_from_arrival_times() {
        let ctx = context(ControlPolicy::Persist);
        let mut session = IngestSession::new(1, peer(), None, ctx.clone());
        let base = Instant::now();

        for i in 0..3u64 {
            session
                .on_frame(Bytes::from_static(b"x"), base + Duration::from_secs(i))
                .await;
        }

        let stats = ctx.registry.client_stats(&session.client_id).await.unwrap();
        assert!((stats.fps - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pending_control_forwarded_after_frame() {
        let ctx = context(ControlPolicy::Persist);
        let mut session = IngestSession::new(1, peer(), None, ctx.clone());

        ctx.relay
            .set(session.client_id.clone(), ControlCommand::new(0.5, -0.25))
            .await;

        let reply = session.handle(frame()).await;
        assert_eq!(reply, Some(IngestReply::Text("CONTROL:0.5:-0.25".into())));

        // Persist policy repeats
        let reply = session.handle(frame()).await;
        assert_eq!(reply, Some(IngestReply::Text("CONTROL:0.5:-0.25".into())));
    }

    #[tokio::test]
    async fn test_consume_once_forwards_once() {
        let ctx = context(ControlPolicy::ConsumeOnce);
        let mut session = IngestSession::new(1, peer(), None, ctx.clone());

        ctx.relay
            .set(session.client_id.clone(), ControlCommand::new(1.0, 1.0))
            .await;

        assert!(session.handle(frame()).await.is_some());
        assert!(session.handle(frame()).await.is_none());
    }

    #[tokio::test]
    async fn test_control_update_replies_with_summary() {
        let ctx = context(ControlPolicy::Persist);
        let mut camera = IngestSession::new(1, peer(), None, ctx.clone());
        camera.handle(frame()).await;

        let viewer_addr: SocketAddr = "10.1.1.1:4000".parse().unwrap();
        let mut viewer = IngestSession::new(2, viewer_addr, None, ctx.clone());
        let reply = viewer
            .handle(IngestMessage::Text(r#"{"192.168.1.20": [0.1, "0.9"]}"#.into()))
            .await;

        let Some(IngestReply::Text(json)) = reply else {
            panic!("expected summary reply, got {reply:?}");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["192.168.1.20"]["frame_count"], 1);
        assert_eq!(value["192.168.1.20"]["fps"], 0.0);

        // Sending controls does not register the controller as a frame source
        assert_eq!(ctx.registry.client_count().await, 1);

        let reply = camera.handle(frame()).await;
        assert_eq!(reply, Some(IngestReply::Text("CONTROL:0.1:0.9".into())));
    }

    #[tokio::test]
    async fn test_malformed_control_keeps_session_open() {
        let ctx = context(ControlPolicy::Persist);
        let mut session = IngestSession::new(1, peer(), None, ctx.clone());

        let reply = session.handle(IngestMessage::Text("{not json".into())).await;
        assert!(reply.is_none());
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.dropped_messages(), 1);

        let reply = session
            .handle(IngestMessage::Text(r#"{"a": [1, 2]}"#.into()))
            .await;
        assert!(matches!(reply, Some(IngestReply::Text(_))));
        assert_eq!(
            ctx.relay.get(&"a".into()).await,
            Some(ControlCommand::new(1.0, 2.0))
        );
    }

    #[tokio::test]
    async fn test_close_command() {
        let ctx = context(ControlPolicy::Persist);
        let mut session = IngestSession::new(1, peer(), None, ctx);

        let reply = session.handle(IngestMessage::Text("close".into())).await;
        assert_eq!(reply, Some(IngestReply::Close));
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn test_other_messages_ignored() {
        let ctx = context(ControlPolicy::Persist);
        let mut session = IngestSession::new(1, peer(), None, ctx.clone());

        assert!(session.handle(IngestMessage::Other("ping")).await.is_none());
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(ctx.registry.client_count().await, 0);
    }
}
