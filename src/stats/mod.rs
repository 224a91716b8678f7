//! Server and client statistics

pub mod metrics;

pub use metrics::{round_fps, summarize, ClientSummary, ServerMetrics, ServerStats};
