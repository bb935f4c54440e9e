//! Convenience re-exports for common use.

pub use crate::backend::{FacilityClient, FacilitySearchResponse, SpeechClient};
pub use crate::capture::{
    AudioCapture, AudioChunk, AudioEncoding, CaptureBackend, CaptureStream,
};
pub use crate::commands::{ClientCommand, CommandDispatcher};
pub use crate::config::{CaptureConfig, SessionConfig};
pub use crate::error::{Result, VoiceError};
pub use crate::playback::{AudioSink, PlaybackSequencer};
pub use crate::session::{SessionEvent, TurnState, VoiceSession};
pub use crate::types::{Facility, FacilitySearchQuery, MapMarker, MapRequest};
pub use crate::widget::{WidgetBus, WidgetEvent};
