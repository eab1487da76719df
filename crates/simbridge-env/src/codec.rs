//! Wire messages exchanged with the simulator.
//!
//! Two shapes travel over the channel:
//!
//! - **Control messages**: UTF-8 JSON objects, read by field name. Unknown
//!   fields are ignored; missing required fields are an error.
//! - **Image payloads**: raw encoded image bytes with no envelope. The codec
//!   never looks inside them; see [`crate::pixels`].
//!
//! # Message Flow
//!
//! **Client → Simulator**: fixed ASCII tokens and the action message
//! - Commands (`RESET`, `STEP`, `EXIT`)
//! - Acknowledgments (`.` after the handshake, `RECEIVED` after each image)
//! - `{"action": [...], "value": [...]}` after a `STEP`
//!
//! **Simulator → Client**: the handshake and per-tick state
//! - Handshake (`state_size`, `observation_size`, ..., `num_agents`)
//! - `{"state": [...], "reward": <number>, "done": "True" | "False"}`

use serde::{Deserialize, Serialize};

use crate::action::ActionValue;
use crate::descriptor::{DescriptorParts, EnvironmentDescriptor, StateSpaceType};
use crate::error::{Error, Result};

// COMMANDS
// ════════
/// Start a new episode.
pub const RESET: &[u8] = b"RESET";

/// Advance the simulation by one tick; followed by an action message.
pub const STEP: &[u8] = b"STEP";

/// Shut the simulator down. Nothing follows.
pub const EXIT: &[u8] = b"EXIT";

// ACKNOWLEDGMENTS
// ═══════════════
/// Reply to the handshake message.
pub const HANDSHAKE_ACK: &[u8] = b".";

/// Reply to every image payload.
pub const FRAME_ACK: &[u8] = b"RECEIVED";

/// Handshake message sent by the simulator right after it connects.
#[derive(Debug, Clone, Deserialize)]
struct HandshakeMessage {
    state_size: usize,
    observation_size: usize,
    action_size: usize,
    action_descriptions: Vec<String>,
    env_name: String,
    action_space_type: String,
    state_space_type: String,
    num_agents: usize,
}

/// Action message sent after a `STEP` token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    /// Flattened action vector
    pub action: Vec<ActionValue>,
    /// Value estimates, forwarded for display
    pub value: Vec<f64>,
}

/// Per-tick state message, as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
struct StateMessage {
    state: Vec<f64>,
    reward: WireNumber,
    done: WireFlag,
}

/// Numbers that may arrive as JSON numbers or as numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Number(f64),
    Text(String),
}

/// Booleans spelled the way the simulator spells them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireFlag {
    Flag(bool),
    Text(String),
}

/// Decoded per-tick state.
#[derive(Debug, Clone, PartialEq)]
pub struct TickState {
    pub state: Vec<f64>,
    pub reward: f64,
    pub done: bool,
}

/// Decode the handshake into an environment descriptor.
///
/// # Errors
/// Returns [`Error::MalformedHandshake`] for invalid UTF-8 or JSON, missing
/// fields, an unknown action space type, or zero agents.
pub fn decode_handshake(frame: &[u8]) -> Result<EnvironmentDescriptor> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| Error::malformed_handshake(format!("handshake is not UTF-8: {e}")))?;
    let message: HandshakeMessage = serde_json::from_str(text)
        .map_err(|e| Error::malformed_handshake(e.to_string()))?;

    if message.num_agents == 0 {
        return Err(Error::malformed_handshake("num_agents must be at least 1"));
    }

    Ok(EnvironmentDescriptor::from_parts(DescriptorParts {
        state_space_size: message.state_size,
        observation_count: message.observation_size,
        action_space_size: message.action_size,
        action_descriptions: message.action_descriptions,
        environment_name: message.env_name,
        action_space_type: message.action_space_type.parse()?,
        state_space_type: StateSpaceType::from(message.state_space_type.as_str()),
        agent_count: message.num_agents,
    }))
}

/// Encode an action message as UTF-8 JSON.
///
/// JSON has no spelling for NaN or infinity, so those are refused here
/// rather than written as `null`.
///
/// # Errors
/// Returns [`Error::NonFiniteValue`] for a NaN or infinite element, or
/// [`Error::MalformedMessage`] if serialization fails.
pub fn encode_action(message: &ActionMessage) -> Result<Vec<u8>> {
    if let Some(index) = message.action.iter().position(|v| !v.as_f64().is_finite()) {
        return Err(Error::non_finite_value("action", index));
    }
    if let Some(index) = message.value.iter().position(|v| !v.is_finite()) {
        return Err(Error::non_finite_value("value", index));
    }
    serde_json::to_vec(message).map_err(|e| Error::malformed_message(e.to_string()))
}

/// Decode an action message (the simulator's side of [`encode_action`]).
///
/// # Errors
/// Returns [`Error::MalformedMessage`] for invalid UTF-8, JSON or fields.
pub fn decode_action(frame: &[u8]) -> Result<ActionMessage> {
    serde_json::from_slice(frame).map_err(|e| Error::malformed_message(e.to_string()))
}

/// Decode the per-tick state message.
///
/// # Errors
/// Returns [`Error::MalformedMessage`] for invalid JSON, missing fields, a
/// reward that is not a number, or a `done` flag other than `"True"`,
/// `"False"` or a JSON boolean.
pub fn decode_state(frame: &[u8]) -> Result<TickState> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| Error::malformed_message(format!("state message is not UTF-8: {e}")))?;
    let message: StateMessage =
        serde_json::from_str(text).map_err(|e| Error::malformed_message(e.to_string()))?;

    Ok(TickState {
        state: message.state,
        reward: parse_reward(message.reward)?,
        done: parse_flag(message.done)?,
    })
}

/// Parse a wire boolean. Only the exact strings `"True"` and `"False"` are
/// accepted in text form.
///
/// # Errors
/// Returns [`Error::MalformedMessage`] for any other spelling.
pub fn parse_wire_bool(text: &str) -> Result<bool> {
    match text {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(Error::malformed_message(format!(
            "expected \"True\" or \"False\", got \"{other}\""
        ))),
    }
}

fn parse_flag(flag: WireFlag) -> Result<bool> {
    match flag {
        WireFlag::Flag(value) => Ok(value),
        WireFlag::Text(text) => parse_wire_bool(&text),
    }
}

fn parse_reward(reward: WireNumber) -> Result<f64> {
    match reward {
        WireNumber::Number(value) => Ok(value),
        WireNumber::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| Error::malformed_message(format!("reward '{text}' is not a number"))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::descriptor::ActionSpaceType;

    const HANDSHAKE: &str = r#"{"state_size":4,"observation_size":1,"action_size":2,"action_descriptions":["left","right"],"env_name":"Test","action_space_type":"discrete","state_space_type":"vector","num_agents":1}"#;

    #[test]
    fn test_decode_handshake_populates_descriptor() {
        let descriptor = decode_handshake(HANDSHAKE.as_bytes()).unwrap();

        assert_eq!(descriptor.environment_name(), "Test");
        assert_eq!(descriptor.state_space_size(), 4);
        assert_eq!(descriptor.observation_count(), 1);
        assert_eq!(descriptor.action_space_size(), 2);
        assert_eq!(descriptor.action_descriptions(), ["left", "right"]);
        assert_eq!(descriptor.action_space_type(), ActionSpaceType::Discrete);
        assert_eq!(descriptor.state_space_type().as_str(), "vector");
        assert_eq!(descriptor.agent_count(), 1);
    }

    #[test]
    fn test_decode_handshake_ignores_unknown_fields() {
        let with_extra = HANDSHAKE.replacen('{', r#"{"api_version":"0.3","#, 1);
        assert!(decode_handshake(with_extra.as_bytes()).is_ok());
    }

    #[test]
    fn test_decode_handshake_missing_field_is_malformed() {
        let missing = r#"{"state_size":4,"observation_size":1,"action_size":2,"action_descriptions":[],"env_name":"Test","action_space_type":"discrete","state_space_type":"vector"}"#;

        let err = decode_handshake(missing.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MalformedHandshake { ref reason } if reason.contains("num_agents")));
    }

    #[test]
    fn test_decode_handshake_rejects_unknown_action_space() {
        let odd = HANDSHAKE.replace("\"discrete\"", "\"hybrid\"");
        assert!(matches!(
            decode_handshake(odd.as_bytes()),
            Err(Error::MalformedHandshake { .. })
        ));
    }

    #[test]
    fn test_decode_handshake_rejects_garbage() {
        assert!(matches!(
            decode_handshake(&[0xff, 0xfe]),
            Err(Error::MalformedHandshake { .. })
        ));
        assert!(matches!(
            decode_handshake(b"RESET"),
            Err(Error::MalformedHandshake { .. })
        ));
    }

    #[test]
    fn test_encode_action_wire_shape() {
        let message = ActionMessage {
            action: vec![ActionValue::Int(0)],
            value: vec![0.5],
        };

        let bytes = encode_action(&message).unwrap();

        assert_eq!(bytes, br#"{"action":[0],"value":[0.5]}"#);
        assert_eq!(decode_action(&bytes).unwrap(), message);
    }

    #[test]
    fn test_encode_action_refuses_non_finite_elements() {
        let message = ActionMessage {
            action: vec![ActionValue::Float(f64::NAN), ActionValue::Float(f64::INFINITY)],
            value: vec![f64::NAN],
        };
        assert!(matches!(
            encode_action(&message),
            Err(Error::NonFiniteValue {
                field: "action",
                index: 0
            })
        ));

        let message = ActionMessage {
            action: vec![ActionValue::Int(1)],
            value: vec![0.0, f64::NEG_INFINITY],
        };
        assert!(matches!(
            encode_action(&message),
            Err(Error::NonFiniteValue {
                field: "value",
                index: 1
            })
        ));
    }

    #[test]
    fn test_decode_state_with_string_flag() {
        let tick = decode_state(br#"{"state":[1.0,2.5],"reward":-0.5,"done":"True"}"#).unwrap();

        assert_eq!(tick.state, vec![1.0, 2.5]);
        assert!((tick.reward + 0.5).abs() < f64::EPSILON);
        assert!(tick.done);
    }

    #[test]
    fn test_decode_state_accepts_numeric_string_reward_and_bool_flag() {
        let tick = decode_state(br#"{"state":[],"reward":"1.25","done":false}"#).unwrap();

        assert!((tick.reward - 1.25).abs() < f64::EPSILON);
        assert!(!tick.done);
    }

    #[test]
    fn test_wire_bool_is_case_sensitive() {
        assert!(parse_wire_bool("True").unwrap());
        assert!(!parse_wire_bool("False").unwrap());
        for spelling in ["true", "TRUE", "false", "1", "", " True"] {
            assert!(
                matches!(parse_wire_bool(spelling), Err(Error::MalformedMessage { .. })),
                "{spelling:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_state_rejects_bad_flag_and_missing_fields() {
        assert!(matches!(
            decode_state(br#"{"state":[],"reward":0,"done":"yes"}"#),
            Err(Error::MalformedMessage { .. })
        ));
        assert!(matches!(
            decode_state(br#"{"state":[],"done":"False"}"#),
            Err(Error::MalformedMessage { .. })
        ));
        assert!(matches!(
            decode_state(br#"{"state":[],"reward":"lots","done":"False"}"#),
            Err(Error::MalformedMessage { .. })
        ));
    }
}
