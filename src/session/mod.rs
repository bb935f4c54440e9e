//! The voice conversation session: turn-state machine, keep-alive, and
//! resource ownership.
//!
//! A session exclusively owns the microphone and the realtime channel. All
//! work happens on one cooperative event loop advanced by
//! [`VoiceSession::next_event`]; inbound messages are processed strictly in
//! arrival order, so no handler ever observes another mid-flight.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::capture::{AudioCapture, AudioChunk, CaptureBackend};
use crate::commands::{ClientCommand, CommandDispatcher};
use crate::config::SessionConfig;
use crate::error::{Result, VoiceError};
use crate::playback::{AudioSink, PlaybackSequencer};
use crate::protocol::{InboundEvent, OutboundMessage};
use crate::transport::{Channel, ChannelEvent};

/// Where the session is in its lifecycle.
///
/// `Listening` and `Speaking` are the two active turn states: the capture
/// pipeline runs precisely while `Listening`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Connecting,
    Handshaking,
    Listening,
    Speaking,
    Closed,
}

/// Notifications surfaced to the embedding UI.
#[derive(Debug)]
pub enum SessionEvent {
    /// Handshake answered; the conversation is live.
    Connected { conversation_id: String },
    /// The turn state flipped between listening and speaking.
    TurnChanged(TurnState),
    /// Transcript of the user's speech.
    TranscriptUpdated { text: String },
    /// The agent's textual response (or a correction of it).
    AgentResponded { text: String },
    /// The user spoke over the agent; playback was cancelled.
    Interrupted,
    /// The agent requested a client command; it has been dispatched.
    Command(ClientCommand),
    /// A non-fatal error reported by the agent service.
    AgentError { message: String },
    /// The session reached `Closed`. `None` means a clean end.
    Closed { error: Option<VoiceError> },
}

enum Step {
    Channel(ChannelEvent),
    PlaybackDone(Result<()>),
    Chunk(Option<AudioChunk>),
    Heartbeat,
}

/// One realtime conversation with the remote agent.
pub struct VoiceSession {
    config: SessionConfig,
    backend: Arc<dyn CaptureBackend>,
    dispatcher: CommandDispatcher,
    channel: Option<Channel>,
    capture: Option<AudioCapture>,
    sequencer: PlaybackSequencer,
    heartbeat: Option<Interval>,
    state: TurnState,
    conversation_id: Option<String>,
    transcript: String,
    response: String,
    pending: VecDeque<SessionEvent>,
}

impl VoiceSession {
    /// Create a session (does not connect yet).
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn CaptureBackend>,
        sink: Box<dyn AudioSink>,
        dispatcher: CommandDispatcher,
    ) -> Self {
        Self {
            config,
            backend,
            dispatcher,
            channel: None,
            capture: None,
            sequencer: PlaybackSequencer::new(sink),
            heartbeat: None,
            state: TurnState::Idle,
            conversation_id: None,
            transcript: String::new(),
            response: String::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Conversation identifier assigned by the agent, once live.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn last_transcript(&self) -> &str {
        &self.transcript
    }

    pub fn last_response(&self) -> &str {
        &self.response
    }

    /// Whether the microphone is currently recording.
    pub fn capture_active(&self) -> bool {
        self.capture.as_ref().is_some_and(AudioCapture::is_active)
    }

    /// Open the channel and acquire the microphone, then send the
    /// initiation handshake.
    ///
    /// Channel and capture are opened concurrently, but the handshake is
    /// only sent once capture has succeeded; on any failure both resources
    /// are released before returning.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != TurnState::Idle {
            return Err(VoiceError::InvalidState(
                "a conversation is already active or finished".into(),
            ));
        }
        self.state = TurnState::Connecting;

        let (channel_res, capture_res) = tokio::join!(
            Channel::open(&self.config),
            AudioCapture::acquire(self.backend.as_ref(), &self.config.capture),
        );

        let mut capture = match capture_res {
            Ok(capture) => capture,
            Err(err) => {
                if let Ok(channel) = channel_res {
                    let _ = channel.close().await;
                }
                self.state = TurnState::Closed;
                return Err(err);
            }
        };
        let mut channel = match channel_res {
            Ok(channel) => channel,
            Err(err) => {
                // capture drops here, releasing the device
                self.state = TurnState::Closed;
                return Err(err);
            }
        };

        // No audio flows until the agent confirms initiation.
        capture.pause();
        self.state = TurnState::Handshaking;
        if let Err(err) = channel.handshake(&self.config).await {
            let _ = channel.close().await;
            self.state = TurnState::Closed;
            return Err(err);
        }

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.channel = Some(channel);
        self.capture = Some(capture);
        self.heartbeat = Some(heartbeat);
        Ok(())
    }

    /// Advance the session and return the next UI-visible event.
    ///
    /// Returns `None` once the `Closed` event has been delivered (or if the
    /// session never connected). The session only makes progress while
    /// being polled.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.state == TurnState::Closed || self.channel.is_none() {
                return None;
            }

            let capture_ready = self.state == TurnState::Listening && self.capture_active();
            let playing = self.sequencer.is_playing();

            let step = {
                let Some(channel) = self.channel.as_mut() else {
                    return None;
                };
                let capture = self.capture.as_mut();
                let sequencer = &mut self.sequencer;
                let heartbeat = self.heartbeat.as_mut();

                // `biased` keeps inbound processing ahead of playback
                // completion: an interruption racing a natural `ended` is
                // handled first, and the superseded playback never resumes.
                tokio::select! {
                    biased;
                    event = channel.next() => Step::Channel(event),
                    result = sequencer.ended(), if playing => Step::PlaybackDone(result),
                    chunk = next_chunk(capture), if capture_ready => Step::Chunk(chunk),
                    _ = tick(heartbeat) => Step::Heartbeat,
                }
            };
            self.handle_step(step).await;
        }
    }

    /// Send a typed text message from the user.
    pub async fn send_text(&mut self, message: impl Into<String>) -> Result<()> {
        if !matches!(self.state, TurnState::Listening | TurnState::Speaking) {
            return Err(VoiceError::InvalidState(
                "no active conversation to send to".into(),
            ));
        }
        let message = message.into();
        self.send(OutboundMessage::text(message.clone())).await?;
        self.transcript = message;
        Ok(())
    }

    /// End the conversation, releasing the device and the channel.
    ///
    /// Safe to call from any state; calling it again is a no-op.
    pub async fn end(&mut self) -> Result<()> {
        if self.state != TurnState::Closed {
            info!("ending conversation");
        }
        self.shutdown(None).await;
        Ok(())
    }

    async fn handle_step(&mut self, step: Step) {
        match step {
            Step::Channel(ChannelEvent::Inbound(event)) => self.handle_inbound(event).await,
            Step::Channel(ChannelEvent::Closed(cause)) => self.shutdown(cause).await,
            Step::PlaybackDone(result) => {
                if let Err(err) = result {
                    warn!(error = %err, "playback chunk failed");
                }
                if !self.sequencer.advance().await {
                    self.enter_listening();
                }
            }
            Step::Chunk(Some(chunk)) => {
                if let Err(err) = self.send(OutboundMessage::audio_chunk(&chunk.data)).await {
                    self.shutdown(Some(err)).await;
                }
            }
            Step::Chunk(None) => {
                self.shutdown(Some(VoiceError::DeviceNotFound(
                    "capture stream ended unexpectedly".into(),
                )))
                .await;
            }
            Step::Heartbeat => {
                if let Err(err) = self.send(OutboundMessage::ping()).await {
                    self.shutdown(Some(err)).await;
                }
            }
        }
    }

    async fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::ConversationInitiationMetadata { conversation_id } => {
                info!(%conversation_id, "conversation initiated");
                self.conversation_id = Some(conversation_id.clone());
                self.pending
                    .push_back(SessionEvent::Connected { conversation_id });
                self.enter_listening();
            }
            InboundEvent::Audio { audio_event } => {
                // Audio can only start a turn once the conversation is live.
                if !matches!(self.state, TurnState::Listening | TurnState::Speaking) {
                    debug!("discarding audio outside an active turn");
                    return;
                }
                self.sequencer
                    .enqueue(&audio_event.audio_base_64, &audio_event.mime_type);
                if self.state == TurnState::Listening {
                    self.enter_speaking();
                }
                if !self.sequencer.advance().await && self.state == TurnState::Speaking {
                    // Every queued chunk failed to start; fail open so the
                    // user is heard again.
                    self.enter_listening();
                }
            }
            InboundEvent::Interruption => {
                if self.state == TurnState::Speaking {
                    debug!("agent speech interrupted by user");
                    if let Err(err) = self.sequencer.stop().await {
                        warn!(error = %err, "playback did not stop cleanly");
                    }
                    self.pending.push_back(SessionEvent::Interrupted);
                    self.enter_listening();
                }
            }
            InboundEvent::Ping => {
                if let Err(err) = self.send(OutboundMessage::pong()).await {
                    self.shutdown(Some(err)).await;
                }
            }
            InboundEvent::Pong => debug!("keep-alive acknowledged"),
            InboundEvent::UserTranscript { user_transcript } => {
                self.transcript.clone_from(&user_transcript.text);
                self.pending.push_back(SessionEvent::TranscriptUpdated {
                    text: user_transcript.text,
                });
            }
            InboundEvent::AgentResponse { agent_response } => {
                self.response.clone_from(&agent_response.text);
                self.pending.push_back(SessionEvent::AgentResponded {
                    text: agent_response.text,
                });
            }
            InboundEvent::AgentResponseCorrection {
                agent_response_correction,
            } => {
                self.response.clone_from(&agent_response_correction.text);
                self.pending.push_back(SessionEvent::AgentResponded {
                    text: agent_response_correction.text,
                });
            }
            InboundEvent::Error { error } => {
                warn!(message = %error.message, "agent service reported an error");
                self.pending
                    .push_back(SessionEvent::AgentError {
                        message: error.message,
                    });
            }
            InboundEvent::ConversationEnd => {
                info!("conversation ended by agent");
                self.shutdown(None).await;
            }
            InboundEvent::ClientToolCall { client_tool_call } => {
                if let Some(command) = self
                    .dispatcher
                    .dispatch(&client_tool_call.tool_name, client_tool_call.parameters)
                    .await
                {
                    self.pending.push_back(SessionEvent::Command(command));
                }
            }
            InboundEvent::Unknown => {
                debug!("ignoring unknown inbound message type");
            }
        }
    }

    fn enter_listening(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.resume();
        }
        self.state = TurnState::Listening;
        self.pending
            .push_back(SessionEvent::TurnChanged(TurnState::Listening));
    }

    fn enter_speaking(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.pause();
        }
        self.state = TurnState::Speaking;
        self.pending
            .push_back(SessionEvent::TurnChanged(TurnState::Speaking));
    }

    async fn send(&mut self, message: OutboundMessage) -> Result<()> {
        match self.channel.as_mut() {
            Some(channel) => channel.send(&message).await,
            None => Err(VoiceError::InvalidState("channel is not open".into())),
        }
    }

    /// Release every resource and move to `Closed`, exactly once.
    async fn shutdown(&mut self, error: Option<VoiceError>) {
        if self.state == TurnState::Closed {
            return;
        }
        self.capture = None; // releases the device
        self.heartbeat = None;
        if let Err(err) = self.sequencer.stop().await {
            warn!(error = %err, "playback did not stop cleanly during shutdown");
        }
        if let Some(channel) = self.channel.take() {
            if let Err(err) = channel.close().await {
                debug!(error = %err, "channel close during shutdown failed");
            }
        }
        self.conversation_id = None;
        self.state = TurnState::Closed;
        self.pending.push_back(SessionEvent::Closed { error });
    }
}

async fn next_chunk(capture: Option<&mut AudioCapture>) -> Option<AudioChunk> {
    match capture {
        Some(capture) => capture.next_chunk().await,
        None => std::future::pending().await,
    }
}

async fn tick(heartbeat: Option<&mut Interval>) {
    match heartbeat {
        Some(heartbeat) => {
            heartbeat.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::WidgetBus;
    use async_trait::async_trait;

    struct NullSink;

    #[async_trait]
    impl AudioSink for NullSink {
        async fn begin(&mut self, _audio: Vec<u8>, _mime_type: &str) -> Result<()> {
            Ok(())
        }
        async fn ended(&mut self) -> Result<()> {
            Ok(())
        }
        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct NoDeviceBackend;

    #[async_trait]
    impl CaptureBackend for NoDeviceBackend {
        fn capture_supported(&self) -> bool {
            false
        }
        fn encoding_supported(&self, _encoding: crate::capture::AudioEncoding) -> bool {
            false
        }
        async fn open(
            &self,
            _encoding: crate::capture::AudioEncoding,
            _chunk_interval: std::time::Duration,
        ) -> Result<Box<dyn crate::capture::CaptureStream>> {
            Err(VoiceError::Unsupported("no device".into()))
        }
    }

    fn idle_session() -> VoiceSession {
        VoiceSession::new(
            SessionConfig::new("agent", "key"),
            Arc::new(NoDeviceBackend),
            Box::new(NullSink),
            CommandDispatcher::new(WidgetBus::default()),
        )
    }

    #[tokio::test]
    async fn end_is_safe_and_idempotent_from_idle() {
        let mut session = idle_session();
        session.end().await.unwrap();
        session.end().await.unwrap();
        assert_eq!(session.state(), TurnState::Closed);

        match session.next_event().await {
            Some(SessionEvent::Closed { error: None }) => {}
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn connect_is_rejected_after_close() {
        let mut session = idle_session();
        session.end().await.unwrap();
        let error = session.connect().await.unwrap_err();
        assert!(matches!(error, VoiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn send_text_requires_an_active_conversation() {
        let mut session = idle_session();
        let error = session.send_text("hello").await.unwrap_err();
        assert!(matches!(error, VoiceError::InvalidState(_)));
    }
}
