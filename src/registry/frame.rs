//! Client identity and frame types
//!
//! This module defines the key type for identifying frame sources and the
//! frames stored for them.

use std::time::Instant;

use bytes::Bytes;

/// Identity of a frame source (peer address or an assigned name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Create a new client id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A compressed still frame and the time it arrived
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone)]
pub struct TimedFrame {
    /// Compressed image bytes (opaque, normally JPEG)
    pub data: Bytes,
    /// Arrival time
    pub received_at: Instant,
}

impl TimedFrame {
    /// Create a new timed frame
    pub fn new(data: Bytes, received_at: Instant) -> Self {
        Self { data, received_at }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// One entry of a registry snapshot: a client and its latest frame
///
/// `frame` is `None` when the client is registered but its buffer is empty;
/// the compositor leaves that cell blank.
#[derive(Debug, Clone)]
pub struct ClientFrame {
    /// Source identity
    pub id: ClientId,
    /// Most recent compressed frame at snapshot time
    pub frame: Option<Bytes>,
}

impl ClientFrame {
    /// Create a snapshot entry
    pub fn new(id: ClientId, frame: Option<Bytes>) -> Self {
        Self { id, frame }
    }
}
