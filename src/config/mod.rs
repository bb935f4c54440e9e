//! Session configuration (code defaults, overridable from env).

use std::time::Duration;

use crate::capture::AudioEncoding;
use crate::error::{Result, VoiceError};

/// Default realtime endpoint for the conversational agent service.
pub const DEFAULT_BASE_URL: &str = "wss://api.elevenlabs.io/v1/convai/conversation";

/// Keep-alive cadence while the channel is open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for one voice conversation session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier of the remote agent to converse with.
    pub agent_id: String,
    /// API key sent in the initiation handshake.
    pub api_key: String,
    /// WebSocket endpoint (without the `agent_id` query parameter).
    pub base_url: String,
    /// Interval between outbound keep-alive pings.
    pub heartbeat_interval: Duration,
    /// Audio capture settings.
    pub capture: CaptureConfig,
}

/// Audio capture settings.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Cadence at which the capture stream emits chunks.
    pub chunk_interval: Duration,
    /// Encoding preference list, descending. First supported wins.
    pub preferences: Vec<AudioEncoding>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_secs(1),
            preferences: AudioEncoding::preference_order().to_vec(),
        }
    }
}

impl SessionConfig {
    /// Create a config for an agent with defaults for everything else.
    pub fn new(agent_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            capture: CaptureConfig::default(),
        }
    }

    /// Load from environment variables (`ELEVENLABS_API_KEY`, `AVA_AGENT_ID`,
    /// optional `AVA_VOICE_BASE_URL`).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let api_key = std::env::var("ELEVENLABS_API_KEY").map_err(|_| {
            VoiceError::AuthInvalid("ELEVENLABS_API_KEY is not configured".into())
        })?;
        let agent_id = std::env::var("AVA_AGENT_ID").map_err(|_| {
            VoiceError::AgentNotFound("AVA_AGENT_ID is not configured".into())
        })?;

        let mut config = Self::new(agent_id, api_key);
        if let Ok(url) = std::env::var("AVA_VOICE_BASE_URL") {
            config.base_url = url;
        }
        Ok(config)
    }

    /// Full WebSocket URL for this agent.
    pub(crate) fn endpoint_url(&self) -> String {
        format!("{}?agent_id={}", self.base_url, self.agent_id)
    }
}
