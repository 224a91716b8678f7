//! Control command types
//!
//! A control command is a pair of numeric set-points (pan/tilt, throttle/steer)
//! addressed to one frame source. On the wire it is a two-element JSON array.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::ClientId;

/// Prefix of the directive sent back to a source
pub const CONTROL_DIRECTIVE_PREFIX: &str = "CONTROL";

/// A pair of set-points for one source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[AxisValue; 2]", into = "[f64; 2]")]
pub struct ControlCommand {
    /// First set-point
    pub x: f64,
    /// Second set-point
    pub y: f64,
}

impl ControlCommand {
    /// Create a new command
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Text directive forwarded to the source: `CONTROL:<x>:<y>`
    pub fn directive(&self) -> String {
        format!("{}:{}:{}", CONTROL_DIRECTIVE_PREFIX, self.x, self.y)
    }
}

impl From<ControlCommand> for [f64; 2] {
    fn from(cmd: ControlCommand) -> Self {
        [cmd.x, cmd.y]
    }
}

/// One axis value as sent by controllers: a number or a numeric string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AxisValue {
    /// Plain JSON number
    Number(f64),
    /// Number formatted as a string
    Text(String),
}

impl AxisValue {
    fn value(self) -> std::result::Result<f64, String> {
        match self {
            AxisValue::Number(v) => Ok(v),
            AxisValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("axis value is not numeric: {s:?}")),
        }
    }
}

impl TryFrom<[AxisValue; 2]> for ControlCommand {
    type Error = String;

    fn try_from([x, y]: [AxisValue; 2]) -> std::result::Result<Self, Self::Error> {
        let (x, y) = (x.value()?, y.value()?);
        if !x.is_finite() || !y.is_finite() {
            return Err("axis value is not finite".into());
        }
        Ok(Self { x, y })
    }
}

/// Parse a control update: a JSON object mapping client id to `[x, y]`
///
/// The update is all-or-nothing: one malformed entry rejects the message.
pub fn parse_control_update(text: &str) -> Result<Vec<(ClientId, ControlCommand)>> {
    let update: HashMap<String, ControlCommand> = serde_json::from_str(text)?;
    Ok(update
        .into_iter()
        .map(|(id, cmd)| (ClientId::from(id), cmd))
        .collect())
}
