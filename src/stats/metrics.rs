//! Statistics and metrics for the grid server

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::registry::{ClientId, ClientStats};

/// Round a rate to one decimal place for reporting
pub fn round_fps(fps: f64) -> f64 {
    (fps * 10.0).round() / 10.0
}

/// Live counters shared by every connection task
#[derive(Debug)]
pub struct ServerMetrics {
    started_at: Instant,
    ingest_total: AtomicU64,
    ingest_active: AtomicU64,
    viewers_total: AtomicU64,
    viewers_active: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_published: AtomicU64,
    compositor_failures: AtomicU64,
    control_updates: AtomicU64,
    dropped_messages: AtomicU64,
}

impl ServerMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            ingest_total: AtomicU64::new(0),
            ingest_active: AtomicU64::new(0),
            viewers_total: AtomicU64::new(0),
            viewers_active: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            compositor_failures: AtomicU64::new(0),
            control_updates: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// An ingest connection opened
    pub fn ingest_opened(&self) {
        self.ingest_total.fetch_add(1, Ordering::Relaxed);
        self.ingest_active.fetch_add(1, Ordering::Relaxed);
    }

    /// An ingest connection closed
    pub fn ingest_closed(&self) {
        self.ingest_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// A viewer stream started
    pub fn viewer_opened(&self) {
        self.viewers_total.fetch_add(1, Ordering::Relaxed);
        self.viewers_active.fetch_add(1, Ordering::Relaxed);
    }

    /// A viewer stream ended
    pub fn viewer_closed(&self) {
        self.viewers_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// A frame arrived from a source
    pub fn frame_received(&self, size: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// A composite was written to a viewer
    pub fn frame_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    /// A compositor cycle failed
    pub fn compositor_failed(&self) {
        self.compositor_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A control update was accepted
    pub fn control_updated(&self) {
        self.control_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// A message was dropped as malformed or unsupported
    pub fn message_dropped(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Server uptime
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            uptime_secs: self.uptime().as_secs(),
            ingest_total: self.ingest_total.load(Ordering::Relaxed),
            ingest_active: self.ingest_active.load(Ordering::Relaxed),
            viewers_total: self.viewers_total.load(Ordering::Relaxed),
            viewers_active: self.viewers_active.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            compositor_failures: self.compositor_failures.load(Ordering::Relaxed),
            control_updates: self.control_updates.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    /// Seconds since start
    pub uptime_secs: u64,
    /// Ingest connections ever accepted
    pub ingest_total: u64,
    /// Ingest connections currently open
    pub ingest_active: u64,
    /// Viewer streams ever started
    pub viewers_total: u64,
    /// Viewer streams currently open
    pub viewers_active: u64,
    /// Frames received from all sources
    pub frames_received: u64,
    /// Frame bytes received from all sources
    pub bytes_received: u64,
    /// Composites written to viewers
    pub frames_published: u64,
    /// Compositor cycles that fell back to a previous or blank frame
    pub compositor_failures: u64,
    /// Accepted control updates
    pub control_updates: u64,
    /// Malformed or unsupported messages dropped
    pub dropped_messages: u64,
}

/// Per-client entry of a summary reply: `{"fps": .., "frame_count": ..}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClientSummary {
    /// Frame rate rounded to one decimal
    pub fps: f64,
    /// Frames currently buffered
    pub frame_count: usize,
}

impl From<&ClientStats> for ClientSummary {
    fn from(stats: &ClientStats) -> Self {
        Self {
            fps: round_fps(stats.fps),
            frame_count: stats.frame_count,
        }
    }
}

/// Build the id -> summary map sent to controllers and served on the status route
pub fn summarize(stats: &[(ClientId, ClientStats)]) -> BTreeMap<String, ClientSummary> {
    stats
        .iter()
        .map(|(id, s)| (id.to_string(), ClientSummary::from(s)))
        .collect()
}
