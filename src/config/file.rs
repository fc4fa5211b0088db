//! TOML configuration file loading
//!
//! Supports `~/.config/sarathi/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of
//! defaults, and environment variables override both.

use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Interface language tag ("en", "hi", "ta")
    #[serde(default)]
    pub language: Option<String>,

    /// Backend endpoints and credentials
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Voice capture / synthesis configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Backend-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Backend base URL
    pub url: Option<String>,

    /// Public anonymous key
    pub anon_key: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable microphone capture
    pub enabled: Option<bool>,

    /// Synthesis voice identifier
    pub voice_id: Option<String>,
}

/// Load and parse the config file at `path`
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)?;
    let parsed = toml::from_str(&raw)?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            language = "ta"

            [voice]
            voice_id = "custom-voice"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.language.as_deref(), Some("ta"));
        assert_eq!(parsed.voice.voice_id.as_deref(), Some("custom-voice"));
        assert!(parsed.voice.enabled.is_none());
        assert!(parsed.backend.url.is_none());
    }

    #[test]
    fn empty_file_parses_to_defaults() {
        let parsed: ConfigFile = toml::from_str("").unwrap();
        assert!(parsed.language.is_none());
        assert!(parsed.backend.anon_key.is_none());
    }
}
