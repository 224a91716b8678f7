//! Grid compositor
//!
//! Turns a registry snapshot into one image: clients are laid out in a
//! near-square grid in snapshot order, each cell showing that client's most
//! recent frame.

pub mod layout;
pub mod render;

pub use layout::GridLayout;
pub use render::{
    BlankReason, CompositeImage, Compositor, DEFAULT_CELL_HEIGHT, DEFAULT_CELL_WIDTH,
    DEFAULT_JPEG_QUALITY, MAX_CELL_DIMENSION,
};
