//! camgrid: tile live camera frames into one MJPEG grid stream
//!
//! Frame sources connect over WebSocket and push JPEG stills. The server
//! keeps a short history per source, composites the latest frame of every
//! source into a near-square grid, and streams the grid to any number of
//! HTTP viewers as `multipart/x-mixed-replace`. Viewers can steer a source
//! by posting a control update; the source receives it as a text directive
//! after its next frame.
//!
//! ```text
//!   sources ──/ws──▶ IngestSession ──▶ ClientRegistry ◀── snapshot ── StreamPublisher ──/video──▶ viewers
//!      ▲                  │                                                │
//!      └── CONTROL:x:y ───┘◀──────── ControlRelay ◀── JSON update ── controllers (/ws)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use camgrid::{GridServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> camgrid::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let server = GridServer::new(config);
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod compositor;
pub mod control;
pub mod error;
pub mod ingest;
pub mod publisher;
pub mod registry;
pub mod server;
pub mod stats;

pub use error::{Error, Result};
pub use server::{GridServer, ServerConfig};
