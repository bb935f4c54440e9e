//! Shared scripted capture and playback fakes for session tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep_until, Instant};

use ava_voice::capture::{AudioChunk, AudioEncoding, CaptureBackend, CaptureStream};
use ava_voice::error::Result;
use ava_voice::playback::AudioSink;

/// A capture backend producing numbered chunks on a fixed cadence.
///
/// The `released` flag flips to `true` when the opened stream is dropped,
/// so tests can assert the device was given back.
pub struct ScriptedBackend {
    encodings: Vec<AudioEncoding>,
    released: Arc<AtomicBool>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            encodings: vec![AudioEncoding::WebmOpus],
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

#[async_trait]
impl CaptureBackend for ScriptedBackend {
    fn capture_supported(&self) -> bool {
        true
    }

    fn encoding_supported(&self, encoding: AudioEncoding) -> bool {
        self.encodings.contains(&encoding)
    }

    async fn open(
        &self,
        _encoding: AudioEncoding,
        chunk_interval: Duration,
    ) -> Result<Box<dyn CaptureStream>> {
        self.released.store(false, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            active: true,
            chunk_interval,
            next_at: Instant::now() + chunk_interval,
            counter: 0,
            released: Arc::clone(&self.released),
        }))
    }
}

pub struct ScriptedStream {
    active: bool,
    chunk_interval: Duration,
    next_at: Instant,
    counter: u8,
    released: Arc<AtomicBool>,
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CaptureStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Option<AudioChunk> {
        if !self.active {
            std::future::pending::<()>().await;
        }
        // Fixed deadline, so a cancelled wait resumes where it left off.
        sleep_until(self.next_at).await;
        self.next_at += self.chunk_interval;
        self.counter = self.counter.wrapping_add(1);
        Some(AudioChunk::new(vec![self.counter; 4]))
    }

    fn pause(&mut self) {
        self.active = false;
    }

    fn resume(&mut self) {
        self.active = true;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Shared handles observing what a [`ScriptedSink`] was asked to do.
#[derive(Clone, Default)]
pub struct SinkProbe {
    pub played: Arc<Mutex<Vec<Vec<u8>>>>,
    pub stops: Arc<AtomicU32>,
}

impl SinkProbe {
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

/// An audio sink whose playbacks last a fixed duration.
pub struct ScriptedSink {
    probe: SinkProbe,
    chunk_duration: Duration,
    deadline: Option<Instant>,
}

impl ScriptedSink {
    pub fn new(chunk_duration: Duration) -> Self {
        Self {
            probe: SinkProbe::default(),
            chunk_duration,
            deadline: None,
        }
    }

    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl AudioSink for ScriptedSink {
    async fn begin(&mut self, audio: Vec<u8>, _mime_type: &str) -> Result<()> {
        self.probe.played.lock().unwrap().push(audio);
        self.deadline = Some(Instant::now() + self.chunk_duration);
        Ok(())
    }

    async fn ended(&mut self) -> Result<()> {
        match self.deadline {
            // The deadline stays set until the wait actually completes, so
            // a cancelled wait can be restarted.
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
                Ok(())
            }
            None => std::future::pending().await,
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.deadline = None;
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
