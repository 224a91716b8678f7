//! Client registry for multi-source frame ingest
//!
//! The registry maps each frame source to a bounded history of its most recent
//! frames plus derived rate statistics. Ingest tasks append; stream publishers
//! snapshot the latest frame of every source.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<ClientRegistry>
//!                     ┌─────────────────────────┐
//!                     │ clients: IndexMap<Id,   │
//!                     │   ClientEntry {         │
//!                     │     frames: FrameRing,  │
//!                     │     fps, frame_count,   │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Ingest task]          [Ingest task]           [Publisher]
//!    append()               append()                snapshot()
//!                                                        │
//!                                                        └──► compose ──► viewer
//! ```
//!
//! # Zero-Copy Snapshots
//!
//! Frames are stored as `bytes::Bytes`, so a snapshot clones reference counts
//! rather than image data. A snapshot never holds a lock while the compositor
//! runs.

pub mod config;
pub mod entry;
pub mod frame;
pub mod ring;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{ClientEntry, ClientStats};
pub use frame::{ClientFrame, ClientId, TimedFrame};
pub use ring::{FrameRing, DEFAULT_RING_CAPACITY};
pub use store::ClientRegistry;
