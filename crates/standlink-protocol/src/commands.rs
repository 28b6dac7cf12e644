//! The six command shapes exchanged between tablet and laptop hub.
//!
//! Field names are PascalCase on the wire (matching the historical stand
//! firmware); camelCase and all-lowercase spellings are accepted on decode
//! via serde aliases so peer implementation drift does not break framing.

use serde::{Deserialize, Serialize};
use standlink_core::types::{NotificationType, SensorReading, StandState};

// MARK: - CommandKind

/// Discriminators known at boot. Every shape the process can decode is listed
/// here; there is no runtime type scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    EmergencyShutdown,
    Notification,
    RestoredState,
    Sensor,
    StandConnect,
    StandState,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::EmergencyShutdown,
        CommandKind::Notification,
        CommandKind::RestoredState,
        CommandKind::Sensor,
        CommandKind::StandConnect,
        CommandKind::StandState,
    ];

    /// Wire discriminator carried in the `CommandName` field.
    pub fn discriminator(self) -> &'static str {
        match self {
            Self::EmergencyShutdown => "EmergencyShutdownCommand",
            Self::Notification => "NotificationCommand",
            Self::RestoredState => "RestoredStateCommand",
            Self::Sensor => "SensorCommand",
            Self::StandConnect => "StandConnectCommand",
            Self::StandState => "StandStateCommand",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.discriminator())
    }
}

// MARK: - Payload shapes

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmergencyShutdownCommand {
    #[serde(alias = "standNumber", alias = "standnumber")]
    pub stand_number: u32,
    #[serde(alias = "standState", alias = "standstate")]
    pub stand_state: StandState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationCommand {
    #[serde(alias = "standNumber", alias = "standnumber")]
    pub stand_number: u32,
    #[serde(alias = "notificationType", alias = "notificationtype")]
    pub notification_type: NotificationType,
    // Older stand firmware serializes this field as "StandSrate".
    #[serde(
        alias = "standState",
        alias = "standstate",
        alias = "StandSrate",
        alias = "standSrate",
        alias = "standsrate"
    )]
    pub stand_state: StandState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestoredStateCommand {
    #[serde(alias = "standNumber", alias = "standnumber")]
    pub stand_number: u32,
    #[serde(alias = "restoredState", alias = "restoredstate")]
    pub restored_state: StandState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorCommand {
    #[serde(alias = "standNumber", alias = "standnumber")]
    pub stand_number: u32,
    #[serde(alias = "standState", alias = "standstate")]
    pub stand_state: StandState,
    #[serde(
        alias = "sensorReadings",
        alias = "sensorreadings",
        alias = "SensorDisplays",
        alias = "sensorDisplays",
        alias = "sensordisplays",
        default
    )]
    pub sensor_readings: Vec<SensorReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StandConnectCommand {
    #[serde(alias = "standNumber", alias = "standnumber")]
    pub stand_number: u32,
    #[serde(
        alias = "standState",
        alias = "standstate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stand_state: Option<StandState>,
    #[serde(alias = "isConnect", alias = "isconnect")]
    pub is_connect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StandStateCommand {
    #[serde(alias = "standNumber", alias = "standnumber")]
    pub stand_number: u32,
    #[serde(alias = "standState", alias = "standstate")]
    pub stand_state: StandState,
}

// MARK: - Command

/// Tagged union of every payload shape, replacing runtime-type dispatch keys.
///
/// Serializes as a flat JSON object with the discriminator inlined as
/// `CommandName`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "CommandName")]
pub enum Command {
    #[serde(rename = "EmergencyShutdownCommand")]
    EmergencyShutdown(EmergencyShutdownCommand),
    #[serde(rename = "NotificationCommand")]
    Notification(NotificationCommand),
    #[serde(rename = "RestoredStateCommand")]
    RestoredState(RestoredStateCommand),
    #[serde(rename = "SensorCommand")]
    Sensor(SensorCommand),
    #[serde(rename = "StandConnectCommand")]
    StandConnect(StandConnectCommand),
    #[serde(rename = "StandStateCommand")]
    StandState(StandStateCommand),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::EmergencyShutdown(_) => CommandKind::EmergencyShutdown,
            Self::Notification(_) => CommandKind::Notification,
            Self::RestoredState(_) => CommandKind::RestoredState,
            Self::Sensor(_) => CommandKind::Sensor,
            Self::StandConnect(_) => CommandKind::StandConnect,
            Self::StandState(_) => CommandKind::StandState,
        }
    }

    pub fn discriminator(&self) -> &'static str {
        self.kind().discriminator()
    }

    /// Stand number carried by every payload shape.
    pub fn stand_number(&self) -> u32 {
        match self {
            Self::EmergencyShutdown(c) => c.stand_number,
            Self::Notification(c) => c.stand_number,
            Self::RestoredState(c) => c.stand_number,
            Self::Sensor(c) => c.stand_number,
            Self::StandConnect(c) => c.stand_number,
            Self::StandState(c) => c.stand_number,
        }
    }
}
