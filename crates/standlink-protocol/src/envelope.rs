//! Self-describing JSON text envelopes.
//!
//! The codec knows nothing about transports or handlers: it turns a
//! [`Command`] into one UTF-8 frame and extracts the discriminator back out of
//! inbound frames without requiring the payload shape to be known yet.

use serde::de::DeserializeOwned;
use standlink_core::ProtocolError;

use crate::commands::Command;

/// Wire field naming the payload shape. Matched case-insensitively on decode.
pub const COMMAND_NAME_FIELD: &str = "CommandName";

/// Serialize a command into a single text frame.
///
/// Cannot fail for commands built from the shapes in [`crate::commands`]; the
/// error path exists only for exotic registered shapes.
pub fn encode(command: &Command) -> Result<String, ProtocolError> {
    serde_json::to_string(command)
        .map_err(|e| ProtocolError::MalformedEnvelope { reason: e.to_string() })
}

/// Extract the discriminator from a frame without decoding the payload.
pub fn decode_kind(text: &str) -> Result<String, ProtocolError> {
    let document: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| ProtocolError::MalformedEnvelope { reason: e.to_string() })?;

    let object = document.as_object().ok_or_else(|| ProtocolError::MalformedEnvelope {
        reason: "frame is not a JSON object".to_owned(),
    })?;

    let name = object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(COMMAND_NAME_FIELD))
        .and_then(|(_, value)| value.as_str())
        .ok_or_else(|| ProtocolError::MalformedEnvelope {
            reason: format!("'{COMMAND_NAME_FIELD}' field is missing or not a string"),
        })?;

    if name.is_empty() {
        return Err(ProtocolError::MalformedEnvelope {
            reason: format!("'{COMMAND_NAME_FIELD}' field is empty"),
        });
    }

    Ok(name.to_owned())
}

/// Fully decode a frame as payload shape `T`, once its discriminator has been
/// resolved through the registry.
pub fn decode_typed<T: DeserializeOwned>(
    discriminator: &str,
    text: &str,
) -> Result<T, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::SchemaMismatch {
        name: discriminator.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use standlink_core::types::{NotificationType, SensorReading, StandState};

    use super::*;
    use crate::commands::*;

    fn sample_commands() -> Vec<Command> {
        let state = StandState {
            stand_number: 12,
            teacher_connected: true,
            student_connected: true,
            is_emergency: false,
        };
        vec![
            Command::EmergencyShutdown(EmergencyShutdownCommand {
                stand_number: 12,
                stand_state: state.clone(),
            }),
            Command::Notification(NotificationCommand {
                stand_number: 12,
                notification_type: NotificationType::Warning,
                stand_state: state.clone(),
            }),
            Command::RestoredState(RestoredStateCommand {
                stand_number: 12,
                restored_state: state.clone(),
            }),
            Command::Sensor(SensorCommand {
                stand_number: 12,
                stand_state: state.clone(),
                sensor_readings: vec![SensorReading {
                    label: "I_a".to_owned(),
                    value: 4.73,
                    unit: "A".to_owned(),
                }],
            }),
            Command::StandConnect(StandConnectCommand {
                stand_number: 12,
                stand_state: Some(state.clone()),
                is_connect: true,
            }),
            Command::StandState(StandStateCommand { stand_number: 12, stand_state: state }),
        ]
    }

    #[test]
    fn round_trips_every_shape() {
        for command in sample_commands() {
            let frame = encode(&command).expect("encode");
            let decoded: Command = serde_json::from_str(&frame).expect("decode");
            assert_eq!(decoded, command, "round-trip mismatch for {}", command.kind());
        }
    }

    #[test]
    fn frame_carries_inline_discriminator() {
        let frame = encode(&Command::StandConnect(StandConnectCommand {
            stand_number: 12,
            stand_state: None,
            is_connect: true,
        }))
        .expect("encode");

        let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["CommandName"], "StandConnectCommand");
        assert_eq!(value["StandNumber"], 12);
        assert_eq!(value["IsConnect"], true);
        assert_eq!(decode_kind(&frame).expect("kind"), "StandConnectCommand");
    }

    #[test]
    fn discriminator_field_matches_case_insensitively() {
        let frame = r#"{"commandNAME":"SensorCommand","StandNumber":1}"#;
        assert_eq!(decode_kind(frame).expect("kind"), "SensorCommand");
    }

    #[test]
    fn rejects_invalid_json() {
        let err = decode_kind("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope { .. }));
    }

    #[test]
    fn rejects_missing_or_empty_discriminator() {
        for frame in [r#"{"StandNumber":1}"#, r#"{"CommandName":""}"#, r#"{"CommandName":7}"#, "[1,2]"] {
            let err = decode_kind(frame).unwrap_err();
            assert!(matches!(err, ProtocolError::MalformedEnvelope { .. }), "frame: {frame}");
        }
    }

    #[test]
    fn typed_decode_accepts_camel_case_payload() {
        let frame = r#"{"CommandName":"StandStateCommand","standNumber":5,"standState":{"standNumber":5}}"#;
        let command: StandStateCommand = decode_typed("StandStateCommand", frame).expect("typed");
        assert_eq!(command.stand_number, 5);
        assert_eq!(command.stand_state.stand_number, 5);
    }

    #[test]
    fn typed_decode_accepts_lowercase_payload() {
        let frame = r#"{"CommandName":"StandConnectCommand","standnumber":3,"isconnect":true}"#;
        let command: StandConnectCommand = decode_typed("StandConnectCommand", frame).expect("typed");
        assert_eq!(command.stand_number, 3);
        assert!(command.is_connect);
    }

    #[test]
    fn typed_decode_reports_schema_mismatch() {
        let frame = r#"{"CommandName":"StandStateCommand","StandNumber":"five"}"#;
        let err = decode_typed::<StandStateCommand>("StandStateCommand", frame).unwrap_err();
        assert!(matches!(err, ProtocolError::SchemaMismatch { .. }));
    }
}
