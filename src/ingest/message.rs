//! Ingest message types
//!
//! Transport frames are mapped onto [`IngestMessage`] before the session sees
//! them, so dispatch is an explicit match rather than a type check.

use bytes::Bytes;

/// Text message that asks the server to close the connection
pub const CLOSE_COMMAND: &str = "close";

/// One inbound message from a frame source
#[derive(Debug, Clone, PartialEq)]
pub enum IngestMessage {
    /// One compressed still frame
    Binary(Bytes),
    /// JSON control update, or the `close` command
    Text(String),
    /// The peer closed the connection
    Close,
    /// Anything else (ping/pong); logged and ignored
    Other(&'static str),
}

/// What the session wants sent back on the same connection
#[derive(Debug, Clone, PartialEq)]
pub enum IngestReply {
    /// Text message to the peer
    Text(String),
    /// Close the connection
    Close,
}
