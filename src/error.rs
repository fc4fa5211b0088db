//! Error types for the sarathi client

use thiserror::Error;

/// Result type alias for sarathi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the sarathi client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Host environment lacks a required capability (microphone, output device)
    #[error("unsupported capability: {0}")]
    Unsupported(String),

    /// Speech recognizer reported a failure; no transcript was produced
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Streamed generation failed (non-success status or network failure)
    #[error("generation error: {0}")]
    Generation(String),

    /// Streamed generation was cancelled by the caller
    #[error("generation cancelled")]
    GenerationCancelled,

    /// Fetching synthesized audio failed
    #[error("playback fetch error: {0}")]
    PlaybackFetch(String),

    /// Decoding or playing synthesized audio failed
    #[error("playback decode error: {0}")]
    PlaybackDecode(String),

    /// Playback was stopped by the caller
    #[error("playback cancelled")]
    PlaybackCancelled,

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for caller-initiated cancellations.
    ///
    /// UI layers suppress failure messaging for these; every other variant
    /// is a genuine failure worth surfacing.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::GenerationCancelled | Self::PlaybackCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_kinds_are_distinct_from_failures() {
        assert!(Error::GenerationCancelled.is_cancellation());
        assert!(Error::PlaybackCancelled.is_cancellation());
        assert!(!Error::Generation("boom".to_string()).is_cancellation());
        assert!(!Error::PlaybackFetch("500".to_string()).is_cancellation());
        assert!(!Error::PlaybackDecode("bad mp3".to_string()).is_cancellation());
    }
}
