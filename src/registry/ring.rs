//! Bounded frame history for a single client
//!
//! Each source keeps its most recent frames in arrival order. Pushing past
//! capacity drops the oldest frame, so memory per client is bounded no matter
//! how fast the source sends.
//!
//! The buffer also derives the source's frame rate from the arrival times of
//! the frames it currently holds.

use std::collections::VecDeque;

use bytes::Bytes;

use super::frame::TimedFrame;

/// Default number of frames kept per client
pub const DEFAULT_RING_CAPACITY: usize = 10;

/// Fixed-capacity FIFO of timed frames
#[derive(Debug)]
pub struct FrameRing {
    /// Maximum number of frames held
    capacity: usize,
    /// Frames in receipt order, oldest first
    frames: VecDeque<TimedFrame>,
    /// Total payload bytes currently held
    current_size: usize,
}

impl FrameRing {
    /// Create a ring with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Create a ring holding at most `capacity` frames (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
            current_size: 0,
        }
    }

    /// Append a frame, evicting the oldest when full
    ///
    /// Returns the evicted frame, if any.
    pub fn push(&mut self, frame: TimedFrame) -> Option<TimedFrame> {
        let evicted = if self.frames.len() == self.capacity {
            self.frames.pop_front()
        } else {
            None
        };

        if let Some(ref old) = evicted {
            self.current_size -= old.size();
        }

        self.current_size += frame.size();
        self.frames.push_back(frame);
        evicted
    }

    /// Payload of the most recent frame
    pub fn latest(&self) -> Option<&Bytes> {
        self.frames.back().map(|f| &f.data)
    }

    /// Frame rate over the frames currently held
    ///
    /// `(count - 1) / (last - first)` in frames per second. Zero with fewer
    /// than two samples, or when all samples share one arrival instant.
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frames.front(), self.frames.back()) else {
            return 0.0;
        };
        if self.frames.len() < 2 {
            return 0.0;
        }

        let span = last
            .received_at
            .saturating_duration_since(first.received_at)
            .as_secs_f64();
        if span > 0.0 {
            (self.frames.len() - 1) as f64 / span
        } else {
            0.0
        }
    }

    /// Iterate frames oldest first
    pub fn iter(&self) -> impl Iterator<Item = &TimedFrame> {
        self.frames.iter()
    }

    /// Number of frames held
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the ring holds no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total payload bytes held
    pub fn size(&self) -> usize {
        self.current_size
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}
