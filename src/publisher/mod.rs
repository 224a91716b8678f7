//! Composite stream publishing
//!
//! A [`StreamPublisher`] drives one viewer: snapshot, render off the async
//! runtime on the [`WorkerPool`], frame as multipart, pace. Viewers do not
//! share rendered output; each publisher renders its own composites.

pub mod multipart;
pub mod pool;
pub mod stream;

pub use multipart::{encode_part, BOUNDARY, STREAM_CONTENT_TYPE};
pub use pool::WorkerPool;
pub use stream::{
    interval_for_rate, ExitReason, FrameSink, PublisherPhase, PublisherStats, StreamPublisher,
    DEFAULT_PUBLISH_RATE,
};
