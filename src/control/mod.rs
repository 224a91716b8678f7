//! Out-of-band control path from viewers back to frame sources
//!
//! Viewers send a JSON object mapping client ids to two-element set-point
//! arrays. The relay keeps the latest command per client; each time that
//! client delivers a frame, its ingest task forwards the command as a
//! `CONTROL:<x>:<y>` text directive.

pub mod command;
pub mod relay;

pub use command::{parse_control_update, AxisValue, ControlCommand, CONTROL_DIRECTIVE_PREFIX};
pub use relay::{ControlPolicy, ControlRelay};
