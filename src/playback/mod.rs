//! Playback sequencing for synthesized agent speech.
//!
//! Chunks play strictly in arrival order, one at a time; the decoded buffer
//! lives only until its playback completes or is stopped.

use std::collections::VecDeque;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::warn;

use crate::error::{Result, VoiceError};

/// Output device seam: decodes nothing itself, just plays raw bytes.
#[async_trait]
pub trait AudioSink: Send {
    /// Start playing a buffer; returns as soon as playback has begun.
    async fn begin(&mut self, audio: Vec<u8>, mime_type: &str) -> Result<()>;

    /// Resolves when the current playback ends. Must be cancel-safe: the
    /// sequencer drops and recreates this future while waiting.
    async fn ended(&mut self) -> Result<()>;

    /// Stop the current playback immediately. Idempotent.
    async fn stop(&mut self) -> Result<()>;
}

struct PendingChunk {
    data: Vec<u8>,
    mime_type: String,
}

/// Strict-FIFO playback queue over an [`AudioSink`].
pub struct PlaybackSequencer {
    sink: Box<dyn AudioSink>,
    queue: VecDeque<PendingChunk>,
    playing: bool,
}

impl PlaybackSequencer {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            queue: VecDeque::new(),
            playing: false,
        }
    }

    /// Decode a base64 payload and append it to the queue.
    ///
    /// A payload that fails to decode is dropped with a warning; it never
    /// terminates the session.
    pub fn enqueue(&mut self, audio_base64: &str, mime_type: &str) {
        match BASE64.decode(audio_base64) {
            Ok(data) => self.queue.push_back(PendingChunk {
                data,
                mime_type: mime_type.to_string(),
            }),
            Err(err) => warn!(error = %err, "dropping undecodable audio chunk"),
        }
    }

    /// Start the next queued chunk if nothing is playing.
    ///
    /// A chunk the sink refuses to start is dropped (only that chunk) and
    /// the next one is tried. Returns whether playback is now active.
    pub async fn advance(&mut self) -> bool {
        if self.playing {
            return true;
        }
        while let Some(chunk) = self.queue.pop_front() {
            match self.sink.begin(chunk.data, &chunk.mime_type).await {
                Ok(()) => {
                    self.playing = true;
                    return true;
                }
                Err(err) => {
                    warn!(error = %err, "skipping unplayable audio chunk");
                }
            }
        }
        false
    }

    /// Wait for the in-flight playback to end. Call only while
    /// [`is_playing`](Self::is_playing); cancel-safe.
    pub async fn ended(&mut self) -> Result<()> {
        let result = self.sink.ended().await;
        self.playing = false;
        result
    }

    /// Stop playback and discard everything queued.
    ///
    /// Safe mid-playback and when idle; the sink's stop runs exactly once
    /// per in-flight playback.
    pub async fn stop(&mut self) -> Result<()> {
        self.queue.clear();
        if self.playing {
            self.playing = false;
            self.sink.stop().await.map_err(|err| {
                VoiceError::Playback(format!("stop failed: {err}"))
            })
        } else {
            Ok(())
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether nothing is playing and nothing is queued.
    pub fn is_idle(&self) -> bool {
        !self.playing && self.queue.is_empty()
    }
}
