//! # Simulator Interface
//!
//! Telemetry and command definitions for the simulator link. The simulator
//! speaks a SocketIO-style text protocol: event frames are the prefix `42`
//! followed by a JSON array of `[event_name, payload]`. Unlike the rest of
//! the software the numeric fields in telemetry payloads are encoded as JSON
//! strings, so they are parsed here rather than directly deserialised.
//!
//! Frames with a `null` payload are the simulator's "no data" encoding,
//! which signals that the vehicle is being driven manually.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Deserializer, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Prefix marking a message as a SocketIO event frame.
pub const EVENT_PREFIX: &str = "42";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single telemetry sample from the simulator.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Cross track error - lateral distance of the vehicle from the
    /// reference trajectory.
    #[serde(deserialize_with = "f64_from_str")]
    pub cte: f64,

    /// Current speed of the vehicle.
    ///
    /// Units: miles/hour
    #[serde(deserialize_with = "f64_from_str")]
    pub speed: f64,

    /// Current steering angle of the vehicle.
    ///
    /// Units: degrees
    #[serde(deserialize_with = "f64_from_str")]
    pub steering_angle: f64,
}

/// Demands that are sent back to the simulator in response to telemetry.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct SteerDems {
    /// Steering demand, normalised into [-1, 1].
    pub steering_angle: f64,

    /// Throttle demand.
    pub throttle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A message received from the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimMessage {
    /// A telemetry sample to be processed by the controller.
    Telemetry(Telemetry),

    /// The "no data" encoding - the vehicle is in manual driving mode.
    NoData,
}

/// A response to be sent back to the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimResponse {
    /// Steering and throttle demands.
    Steer(SteerDems),

    /// Acknowledgement of manual driving mode.
    Manual,

    /// Command the simulator to reset the vehicle to its starting state.
    Reset,
}

/// Errors which can occur when decoding a simulator frame.
#[derive(Debug, thiserror::Error)]
pub enum SimMessageError {
    #[error("The message is not an event frame: {0:?}")]
    NotAnEvent(String),

    #[error("The event frame does not contain a JSON array: {0:?}")]
    MalformedEvent(String),

    #[error("Could not deserialize the event payload: {0}")]
    DeserializeError(#[from] serde_json::Error),

    #[error("Unknown event {0:?}")]
    UnknownEvent(String),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a raw frame from the simulator into a [`SimMessage`].
pub fn parse_frame(raw: &str) -> Result<SimMessage, SimMessageError> {
    if !raw.starts_with(EVENT_PREFIX) {
        return Err(SimMessageError::NotAnEvent(raw.into()));
    }

    // A null payload is the simulator's manual-driving encoding
    if raw.contains("null") {
        return Ok(SimMessage::NoData);
    }

    // Extract the JSON array between the first `[` and the last `]`
    let start = raw.find('[');
    let end = raw.rfind(']');

    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => return Err(SimMessageError::MalformedEvent(raw.into())),
    };

    let (event, payload): (String, serde_json::Value) = serde_json::from_str(body)?;

    match event.as_str() {
        "telemetry" => {
            let telem: Telemetry = serde_json::from_value(payload)?;
            Ok(SimMessage::Telemetry(telem))
        }
        _ => Err(SimMessageError::UnknownEvent(event)),
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimResponse {
    /// Encode this response as a frame to be sent to the simulator.
    pub fn to_frame(&self) -> String {
        match self {
            SimResponse::Steer(dems) => {
                let body = serde_json::to_string(&("steer", dems))
                    .expect("Steer demand serialization failed. This should not happen");
                format!("{}{}", EVENT_PREFIX, body)
            }
            SimResponse::Manual => format!("{}[\"manual\",{{}}]", EVENT_PREFIX),
            SimResponse::Reset => format!("{}[\"reset\",{{}}]", EVENT_PREFIX),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Deserialize an `f64` which the simulator has encoded as a JSON string.
fn f64_from_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.trim().parse::<f64>().map_err(serde::de::Error::custom)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_telemetry() {
        let raw = r#"42["telemetry",{"cte":"0.7598","speed":"4.4","steering_angle":"-1.25"}]"#;

        let msg = parse_frame(raw).unwrap();

        assert_eq!(
            msg,
            SimMessage::Telemetry(Telemetry {
                cte: 0.7598,
                speed: 4.4,
                steering_angle: -1.25
            })
        );
    }

    #[test]
    fn test_parse_no_data() {
        let msg = parse_frame(r#"42["telemetry",null]"#).unwrap();
        assert_eq!(msg, SimMessage::NoData);
    }

    #[test]
    fn test_parse_not_an_event() {
        assert!(matches!(
            parse_frame("40"),
            Err(SimMessageError::NotAnEvent(_))
        ));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_frame("42oops"),
            Err(SimMessageError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_parse_unknown_event() {
        assert!(matches!(
            parse_frame(r#"42["mystery",{}]"#),
            Err(SimMessageError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_parse_bad_numeric_field() {
        let raw = r#"42["telemetry",{"cte":"abc","speed":"4.4","steering_angle":"0.0"}]"#;
        assert!(matches!(
            parse_frame(raw),
            Err(SimMessageError::DeserializeError(_))
        ));
    }

    #[test]
    fn test_steer_frame() {
        let resp = SimResponse::Steer(SteerDems {
            steering_angle: -0.25,
            throttle: 0.3,
        });

        assert_eq!(
            resp.to_frame(),
            r#"42["steer",{"steering_angle":-0.25,"throttle":0.3}]"#
        );
    }

    #[test]
    fn test_fixed_frames() {
        assert_eq!(SimResponse::Manual.to_frame(), r#"42["manual",{}]"#);
        assert_eq!(SimResponse::Reset.to_frame(), r#"42["reset",{}]"#);
    }
}
