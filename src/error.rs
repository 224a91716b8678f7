//! Error types
//!
//! Every fallible operation in the crate returns [`Result`]. Errors are
//! scoped to the task that produced them: a bad frame or a dropped viewer
//! never propagates into another connection or into the registry.

use crate::server::config::ConfigError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or listener I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame bytes could not be decoded, or the composite could not be encoded
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Malformed control message
    #[error("invalid control message: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The grid does not fit in a canvas
    #[error("composite canvas too large: {rows}x{cols} cells")]
    CanvasTooLarge {
        /// Grid rows
        rows: u32,
        /// Grid columns
        cols: u32,
    },

    /// A compositor job panicked or was cancelled
    #[error("worker pool: {0}")]
    Worker(String),

    /// The worker pool no longer accepts jobs
    #[error("worker pool is shut down")]
    PoolClosed,

    /// The viewer side of a stream went away
    #[error("viewer disconnected")]
    ViewerGone,
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Worker(err.to_string())
    }
}
