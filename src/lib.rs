//! ava-voice -- Realtime voice conversation client
//!
//! This crate drives a hands-free voice conversation with a hosted
//! conversational agent: it streams microphone audio over a WebSocket,
//! plays back synthesized agent speech in order, handles turn-taking and
//! barge-in, and dispatches the agent's client commands (facility search,
//! map display, navigation, toasts) to the embedding UI through a typed
//! event bus.
//!
//! The entry point is [`session::VoiceSession`]: construct it with a
//! [`config::SessionConfig`], a capture backend, and an audio sink, then
//! call `connect` and poll `next_event` until it returns `None`.

pub mod backend;
pub mod capture;
pub mod commands;
pub mod config;
pub mod error;
pub mod playback;
pub mod prelude;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;
pub mod widget;
