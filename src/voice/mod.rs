//! Voice pipeline: capture, transcription, synthesis, playback

pub mod capture;
pub mod lang;
pub mod mic;
pub mod playback;
pub mod stt;
pub mod tts;

pub use capture::{MicRecognizer, Recognizer, RecognizerEvent, VoiceCapture};
pub use lang::Language;
pub use mic::{samples_to_wav, MicInput, UtteranceDetector, SAMPLE_RATE};
pub use playback::{AudioSink, CpalSink, PlaybackState, SpeechPlayback};
pub use stt::SpeechToText;
pub use tts::SpeechSynthesis;
