//! Error types for ava-voice.

use thiserror::Error;

/// Primary error type for all voice session operations.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("No capture device found: {0}")]
    DeviceNotFound(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("Invalid credentials: {0}")]
    AuthInvalid(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol parse error: {0}")]
    ProtocolParse(#[from] serde_json::Error),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Connection closed ({code}): {reason}")]
    ConnectionClosed { code: u16, reason: String },
}

impl VoiceError {
    /// Whether this error terminates the session.
    ///
    /// Parse errors on a single inbound message and playback errors on a
    /// single chunk are recovered locally; every other kind moves the
    /// session to `Closed`.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ProtocolParse(_) | Self::Playback(_))
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VoiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_playback_errors_are_recoverable() {
        let parse = VoiceError::from(
            serde_json::from_str::<serde_json::Value>("not json").unwrap_err(),
        );
        assert!(!parse.is_fatal());
        assert!(!VoiceError::Playback("bad chunk".into()).is_fatal());
    }

    #[test]
    fn transport_and_device_errors_are_fatal() {
        assert!(VoiceError::AuthInvalid("bad key".into()).is_fatal());
        assert!(VoiceError::Network("connection lost".into()).is_fatal());
        assert!(VoiceError::DeviceNotFound("no microphone".into()).is_fatal());
        assert!(VoiceError::ConnectionClosed {
            code: 1011,
            reason: "server error".into()
        }
        .is_fatal());
    }
}
