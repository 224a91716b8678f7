//! Client entry and stats types
//!
//! This module defines the per-client state stored in the registry.

use std::time::Instant;

use bytes::Bytes;

use super::config::RegistryConfig;
use super::frame::TimedFrame;
use super::ring::FrameRing;

/// Entry for a single frame source in the registry
///
/// Written only by the ingest task that owns the source; publishers read it
/// through snapshots.
#[derive(Debug)]
pub struct ClientEntry {
    /// Recent frames, oldest first
    pub frames: FrameRing,

    /// Frame rate over the current ring contents
    pub fps: f64,

    /// Frames currently held (bounded by ring capacity)
    pub frame_count: usize,

    /// When the entry was created
    pub created_at: Instant,

    /// Arrival time of the most recent frame
    pub last_frame_at: Option<Instant>,

    /// Frames received over the entry's lifetime
    pub total_frames: u64,
}

impl ClientEntry {
    /// Create an empty entry
    pub(super) fn new(config: &RegistryConfig) -> Self {
        Self {
            frames: FrameRing::with_capacity(config.ring_capacity),
            fps: 0.0,
            frame_count: 0,
            created_at: Instant::now(),
            last_frame_at: None,
            total_frames: 0,
        }
    }

    /// Append a frame and refresh the derived stats
    pub(super) fn push(&mut self, data: Bytes, received_at: Instant) {
        self.frames.push(TimedFrame::new(data, received_at));
        self.fps = self.frames.fps();
        self.frame_count = self.frames.len();
        self.last_frame_at = Some(received_at);
        self.total_frames += 1;
    }

    /// Latest frame payload, if any
    pub fn latest(&self) -> Option<Bytes> {
        self.frames.latest().cloned()
    }

    /// Time of last activity (last frame, or creation)
    pub fn last_seen(&self) -> Instant {
        self.last_frame_at.unwrap_or(self.created_at)
    }

    /// Stats view of this entry
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            fps: self.fps,
            frame_count: self.frame_count,
            total_frames: self.total_frames,
            buffered_bytes: self.frames.size(),
        }
    }
}

/// Statistics for one client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientStats {
    /// Frame rate over the buffered window
    pub fps: f64,
    /// Frames currently buffered
    pub frame_count: usize,
    /// Frames received since the entry was created
    pub total_frames: u64,
    /// Buffered payload bytes
    pub buffered_bytes: usize,
}
