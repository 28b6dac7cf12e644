use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("Unknown command type: {name}")]
    UnknownCommand { name: String },

    #[error("Payload does not match shape '{name}': {reason}")]
    SchemaMismatch { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Transport failed: {reason}")]
    Transport { reason: String },

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        Self::Transport { reason: err.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum NamingError {
    #[error("Peer name must not be empty")]
    Empty,

    #[error("Peer name '{name}' has no numeric suffix")]
    MissingStandNumber { name: String },

    #[error("Stand number in '{name}' is out of range")]
    StandNumberOutOfRange { name: String },
}
