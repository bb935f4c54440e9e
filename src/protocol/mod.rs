//! Wire protocol for the realtime conversation channel.
//!
//! JSON envelopes are preserved verbatim for compatibility with the hosted
//! agent service: inbound messages are tagged on `type`, outbound messages
//! use the service's mixed envelope shapes (some tagged, some bare).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VoiceError;

/// Fallback MIME type for agent audio, matching the service default.
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

fn default_mime() -> String {
    DEFAULT_AUDIO_MIME.to_string()
}

/// A message received over the conversation channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// First message after the handshake; carries the conversation id.
    ConversationInitiationMetadata { conversation_id: String },
    /// A chunk of synthesized agent speech.
    Audio { audio_event: AudioEventPayload },
    /// Transcript of what the user said.
    UserTranscript { user_transcript: TextPayload },
    /// The agent's textual response.
    AgentResponse { agent_response: TextPayload },
    /// A correction replacing the previous agent response.
    AgentResponseCorrection {
        agent_response_correction: TextPayload,
    },
    /// The user spoke over the agent; playback must stop immediately.
    Interruption,
    Ping,
    Pong,
    /// An error reported by the agent service.
    Error { error: ErrorPayload },
    /// The agent ended the conversation.
    ConversationEnd,
    /// A client command requested by the agent's tool-calling layer.
    ClientToolCall { client_tool_call: ToolCallPayload },
    /// Any message type this client does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioEventPayload {
    pub audio_base_64: String,
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextPayload {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallPayload {
    pub tool_name: String,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

/// A message sent over the conversation channel.
///
/// The service's outbound envelopes are not uniformly tagged, so this
/// serializes untagged with the shape fixed per variant.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Initiation {
        #[serde(rename = "type")]
        kind: &'static str,
        custom_llm_extra_body: InitiationCredentials,
    },
    AudioChunk {
        user_audio_chunk: String,
    },
    Text {
        user_message: String,
    },
    Heartbeat {
        #[serde(rename = "type")]
        kind: &'static str,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiationCredentials {
    pub xi_api_key: String,
}

impl OutboundMessage {
    /// The handshake message; must be sent before any audio flows.
    pub fn initiation(api_key: impl Into<String>) -> Self {
        Self::Initiation {
            kind: "conversation_initiation_client_data",
            custom_llm_extra_body: InitiationCredentials {
                xi_api_key: api_key.into(),
            },
        }
    }

    /// A captured microphone chunk, base64-encoded for transport.
    pub fn audio_chunk(data: &[u8]) -> Self {
        Self::AudioChunk {
            user_audio_chunk: BASE64.encode(data),
        }
    }

    /// A typed text message from the user.
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text {
            user_message: message.into(),
        }
    }

    /// Keep-alive probe.
    pub fn ping() -> Self {
        Self::Heartbeat { kind: "ping" }
    }

    /// Reply to an inbound keep-alive probe.
    pub fn pong() -> Self {
        Self::Heartbeat { kind: "pong" }
    }
}

/// Map a close code to the typed cause surfaced to the UI.
///
/// The code table is fixed by the agent service and must stay stable:
/// 1000 is a clean closure and produces no error.
pub fn close_cause(code: u16, reason: &str) -> Option<VoiceError> {
    match code {
        1000 => None,
        1006 => Some(VoiceError::Network(
            "connection lost unexpectedly".into(),
        )),
        1008 => Some(VoiceError::AuthInvalid(
            "connection rejected; check credentials and agent configuration".into(),
        )),
        1011 => Some(VoiceError::Network(
            "server error; please try again in a moment".into(),
        )),
        4001 => Some(VoiceError::AuthInvalid("invalid API key".into())),
        4003 => Some(VoiceError::AgentNotFound(
            "agent not found; check the agent id configuration".into(),
        )),
        4004 => Some(VoiceError::QuotaExceeded(
            "insufficient credits for this account".into(),
        )),
        other => Some(VoiceError::ConnectionClosed {
            code: other,
            reason: if reason.is_empty() {
                "unknown cause".into()
            } else {
                reason.to_string()
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn initiation_metadata_parses() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "conversation_initiation_metadata",
            "conversation_id": "conv-123"
        }))
        .unwrap();
        assert!(matches!(
            event,
            InboundEvent::ConversationInitiationMetadata { conversation_id } if conversation_id == "conv-123"
        ));
    }

    #[test]
    fn audio_event_defaults_mime_type() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "audio",
            "audio_event": { "audio_base_64": "AAAA" }
        }))
        .unwrap();
        match event {
            InboundEvent::Audio { audio_event } => {
                assert_eq!(audio_event.mime_type, DEFAULT_AUDIO_MIME);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn control_events_tolerate_extra_fields() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "interruption",
            "interruption_event": { "event_id": 7 }
        }))
        .unwrap();
        assert!(matches!(event, InboundEvent::Interruption));
    }

    #[test]
    fn unknown_type_falls_through_to_unknown() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "internal_tentative_agent_response",
            "whatever": true
        }))
        .unwrap();
        assert!(matches!(event, InboundEvent::Unknown));
    }

    #[test]
    fn tool_call_parses_name_and_parameters() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "client_tool_call",
            "client_tool_call": {
                "tool_name": "show_toast",
                "parameters": { "message": "hi" }
            }
        }))
        .unwrap();
        match event {
            InboundEvent::ClientToolCall { client_tool_call } => {
                assert_eq!(client_tool_call.tool_name, "show_toast");
                assert_eq!(client_tool_call.parameters["message"], "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn initiation_envelope_matches_wire_shape() {
        let value = serde_json::to_value(OutboundMessage::initiation("secret")).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "conversation_initiation_client_data",
                "custom_llm_extra_body": { "xi_api_key": "secret" }
            }),
        );
    }

    #[test]
    fn audio_chunk_envelope_is_bare_base64() {
        let value = serde_json::to_value(OutboundMessage::audio_chunk(b"abc")).unwrap();
        assert_eq!(value, json!({ "user_audio_chunk": "YWJj" }));
    }

    #[test]
    fn heartbeat_envelopes_are_tagged_only() {
        assert_eq!(
            serde_json::to_value(OutboundMessage::ping()).unwrap(),
            json!({ "type": "ping" }),
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::pong()).unwrap(),
            json!({ "type": "pong" }),
        );
    }

    #[test]
    fn close_code_table_is_stable() {
        assert!(close_cause(1000, "").is_none());
        assert!(matches!(
            close_cause(1006, "").unwrap(),
            VoiceError::Network(_)
        ));
        assert!(matches!(
            close_cause(1008, "").unwrap(),
            VoiceError::AuthInvalid(_)
        ));
        assert!(matches!(
            close_cause(4001, "").unwrap(),
            VoiceError::AuthInvalid(_)
        ));
        assert!(matches!(
            close_cause(4003, "").unwrap(),
            VoiceError::AgentNotFound(_)
        ));
        assert!(matches!(
            close_cause(4004, "").unwrap(),
            VoiceError::QuotaExceeded(_)
        ));
        match close_cause(4500, "policy violation").unwrap() {
            VoiceError::ConnectionClosed { code, reason } => {
                assert_eq!(code, 4500);
                assert_eq!(reason, "policy violation");
            }
            other => panic!("unexpected cause: {other:?}"),
        }
    }

    #[test]
    fn server_error_close_has_a_dedicated_cause() {
        // 1011 carries its own message rather than the generic code echo.
        match close_cause(1011, "internal failure").unwrap() {
            VoiceError::Network(message) => {
                assert!(message.contains("server error"), "got: {message}");
            }
            other => panic!("unexpected cause: {other:?}"),
        }
    }
}
