//! Frame ingest
//!
//! One session per source connection: binary messages are frames, text
//! messages are control updates (or `close`). The transport loop lives in
//! `server::ws`; everything here is transport independent.

pub mod message;
pub mod session;

pub use message::{IngestMessage, IngestReply, CLOSE_COMMAND};
pub use session::{IngestContext, IngestSession, SessionPhase};
