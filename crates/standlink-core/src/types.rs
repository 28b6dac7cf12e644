use serde::{Deserialize, Serialize};

// MARK: - StandState

/// Joint teacher/student state of a single training stand.
///
/// Carried as an opaque payload inside most commands; the session layer never
/// inspects it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StandState {
    #[serde(alias = "standNumber", alias = "standnumber")]
    pub stand_number: u32,
    #[serde(alias = "teacherConnected", alias = "teacherconnected", default)]
    pub teacher_connected: bool,
    #[serde(alias = "studentConnected", alias = "studentconnected", default)]
    pub student_connected: bool,
    #[serde(alias = "isEmergency", alias = "isemergency", default)]
    pub is_emergency: bool,
}

impl StandState {
    pub fn new(stand_number: u32) -> Self {
        Self { stand_number, ..Self::default() }
    }
}

// MARK: - NotificationType

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Warning,
    Emergency,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

// MARK: - SensorReading

/// One display row of live sensor data from a stand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorReading {
    #[serde(alias = "label")]
    pub label: String,
    #[serde(alias = "value")]
    pub value: f64,
    #[serde(alias = "unit", default)]
    pub unit: String,
}
