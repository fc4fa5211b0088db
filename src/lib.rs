//! Sarathi - voice-first conversational guide client
//!
//! This library provides the multimodal interaction pipeline behind the
//! sarathi CLI:
//! - Voice capture (microphone endpointing + remote transcription)
//! - Streamed answer generation with mid-stream cancellation
//! - Spoken playback of answers with full resource teardown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Host surface (CLI)                  │
//! └───────┬──────────────────┬──────────────────┬───────┘
//!         │                  │                  │
//! ┌───────▼──────┐  ┌────────▼────────┐  ┌──────▼───────┐
//! │ VoiceCapture │  │ StreamingGener. │  │ SpeechPlayb. │
//! │  transcript ─┼─▶│  answer text   ─┼─▶│  audio out   │
//! └──────────────┘  └─────────────────┘  └──────────────┘
//! ```
//!
//! The three components share no state; the host passes transcript and
//! answer text between them by value. Each owns its resources exclusively
//! and releases all of them on stop or drop.

pub mod auth;
pub mod config;
pub mod error;
pub mod generate;
pub mod voice;

pub use auth::{Credential, CredentialResolver};
pub use config::{BackendConfig, Config, VoiceConfig};
pub use error::{Error, Result};
pub use generate::StreamingGenerator;
pub use voice::{
    AudioSink, CpalSink, Language, MicRecognizer, PlaybackState, Recognizer, RecognizerEvent,
    SpeechPlayback, SpeechSynthesis, SpeechToText, VoiceCapture,
};
