//! Microphone capture: capability probe, encoding negotiation, and the
//! chunked capture stream.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::CaptureConfig;
use crate::error::{Result, VoiceError};

/// Audio encodings the widget can stream, in descending preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioEncoding {
    /// Opus in a WebM container.
    WebmOpus,
    /// WebM with the platform's default codec.
    Webm,
    /// AAC in an MP4 container.
    Mp4Aac,
    /// MP4 with the platform's default codec.
    Mp4,
    /// MPEG audio.
    Mpeg,
    /// Uncompressed WAV.
    Wav,
}

impl AudioEncoding {
    /// MIME type string used when negotiating with the platform.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::WebmOpus => "audio/webm;codecs=opus",
            Self::Webm => "audio/webm",
            Self::Mp4Aac => "audio/mp4;codecs=mp4a.40.2",
            Self::Mp4 => "audio/mp4",
            Self::Mpeg => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }

    /// The default negotiation order, most preferred first.
    pub fn preference_order() -> &'static [AudioEncoding] {
        &[
            Self::WebmOpus,
            Self::Webm,
            Self::Mp4Aac,
            Self::Mp4,
            Self::Mpeg,
            Self::Wav,
        ]
    }
}

/// A timestamped buffer of captured microphone audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            captured_at: Utc::now(),
        }
    }
}

/// Platform capture capability, behind a seam so sessions can run against
/// real devices or scripted fakes.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Whether an audio capture device API is present at all.
    fn capture_supported(&self) -> bool;

    /// Whether the platform can record in the given encoding.
    fn encoding_supported(&self, encoding: AudioEncoding) -> bool;

    /// Open the device and start producing chunks at `chunk_interval`.
    ///
    /// Rejections must map to exactly one of `PermissionDenied`,
    /// `DeviceNotFound`, or `Unsupported`.
    async fn open(
        &self,
        encoding: AudioEncoding,
        chunk_interval: Duration,
    ) -> Result<Box<dyn CaptureStream>>;
}

/// An open capture pipeline.
#[async_trait]
pub trait CaptureStream: Send {
    /// Next captured chunk; `None` when the device is gone. Must be
    /// cancel-safe: dropping the future loses no audio already buffered.
    async fn next_chunk(&mut self) -> Option<AudioChunk>;

    /// Suspend chunk production. Idempotent.
    fn pause(&mut self);

    /// Resume chunk production. Idempotent.
    fn resume(&mut self);

    /// Whether the underlying device is currently recording.
    fn is_active(&self) -> bool;
}

/// An acquired microphone with a negotiated encoding.
///
/// Dropping it releases the device; exactly one release per acquire.
pub struct AudioCapture {
    stream: Box<dyn CaptureStream>,
    encoding: AudioEncoding,
}

// Manual impl: the boxed stream is opaque, so report the negotiated
// encoding and the recording state instead.
impl std::fmt::Debug for AudioCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCapture")
            .field("encoding", &self.encoding)
            .field("active", &self.stream.is_active())
            .finish_non_exhaustive()
    }
}

impl AudioCapture {
    /// Probe capability, negotiate an encoding, and open the device.
    pub async fn acquire(backend: &dyn CaptureBackend, config: &CaptureConfig) -> Result<Self> {
        if !backend.capture_supported() {
            return Err(VoiceError::Unsupported(
                "this platform does not support audio capture".into(),
            ));
        }

        let encoding = config
            .preferences
            .iter()
            .copied()
            .find(|candidate| backend.encoding_supported(*candidate))
            .ok_or_else(|| {
                VoiceError::Unsupported("no supported audio encoding found".into())
            })?;
        info!(mime_type = encoding.mime_type(), "negotiated capture encoding");

        let stream = backend.open(encoding, config.chunk_interval).await?;
        Ok(Self { stream, encoding })
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    pub fn pause(&mut self) {
        self.stream.pause();
    }

    pub fn resume(&mut self) {
        self.stream.resume();
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_active()
    }

    /// Next captured chunk; `None` when the device is gone.
    pub async fn next_chunk(&mut self) -> Option<AudioChunk> {
        self.stream.next_chunk().await
    }
}
