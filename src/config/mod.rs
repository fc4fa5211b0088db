//! Configuration management for the sarathi client

pub mod file;

use std::path::PathBuf;

use secrecy::SecretString;

use crate::voice::Language;
use crate::{Error, Result};

/// Default backend base URL (overridable via file or env)
const DEFAULT_BACKEND_URL: &str = "https://api.sarathi.app";

/// Fixed synthesis voice used when none is configured
const DEFAULT_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";

/// Runtime configuration
#[derive(Debug)]
pub struct Config {
    /// Remote backend endpoints and credentials
    pub backend: BackendConfig,

    /// Voice capture / synthesis settings
    pub voice: VoiceConfig,

    /// Interface language (drives recognizer locale and STT language code)
    pub language: Language,
}

/// Backend endpoints and credential material
#[derive(Debug)]
pub struct BackendConfig {
    /// Base URL of the backend
    pub base_url: String,

    /// Public anonymous key (always sent in the `apikey` header)
    pub anon_key: SecretString,

    /// Session access token, if the user is logged in
    pub session_token: Option<SecretString>,
}

impl BackendConfig {
    /// Endpoint for streamed answer generation
    #[must_use]
    pub fn generate_url(&self) -> String {
        format!("{}/functions/v1/ask-guide", self.base_url)
    }

    /// Endpoint for speech synthesis
    #[must_use]
    pub fn synthesize_url(&self) -> String {
        format!("{}/functions/v1/text-to-speech", self.base_url)
    }

    /// Endpoint for speech transcription
    #[must_use]
    pub fn transcribe_url(&self) -> String {
        format!("{}/functions/v1/transcribe", self.base_url)
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable microphone capture
    pub enabled: bool,

    /// Synthesis voice identifier sent to the TTS backend
    pub voice_id: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice_id: DEFAULT_VOICE_ID.to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, overlaid by the TOML config file,
    /// overlaid by environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed, or if
    /// no anonymous key is configured anywhere.
    pub fn load() -> Result<Self> {
        let overlay = Self::config_path()
            .filter(|p| p.exists())
            .map(|p| file::load(&p))
            .transpose()?
            .unwrap_or_default();

        Self::from_overlay(overlay)
    }

    /// Build a config from an already-loaded file overlay plus environment
    fn from_overlay(overlay: file::ConfigFile) -> Result<Self> {
        let base_url = std::env::var("SARATHI_BACKEND_URL")
            .ok()
            .or(overlay.backend.url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let anon_key = std::env::var("SARATHI_ANON_KEY")
            .ok()
            .or(overlay.backend.anon_key)
            .ok_or_else(|| {
                Error::Config(
                    "anonymous key required: set SARATHI_ANON_KEY or backend.anon_key".to_string(),
                )
            })?;

        let session_token = std::env::var("SARATHI_SESSION_TOKEN")
            .ok()
            .map(SecretString::from);

        let voice = VoiceConfig {
            enabled: overlay.voice.enabled.unwrap_or(true),
            voice_id: std::env::var("SARATHI_VOICE_ID")
                .ok()
                .or(overlay.voice.voice_id)
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
        };

        let language = std::env::var("SARATHI_LANGUAGE")
            .ok()
            .or(overlay.language)
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default();

        Ok(Self {
            backend: BackendConfig {
                base_url,
                anon_key: SecretString::from(anon_key),
                session_token,
            },
            voice,
            language,
        })
    }

    /// Path of the persistent config file (`~/.config/sarathi/config.toml`)
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("app", "sarathi", "sarathi")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_derive_from_base() {
        let backend = BackendConfig {
            base_url: "https://example.test".to_string(),
            anon_key: SecretString::from("k"),
            session_token: None,
        };

        assert_eq!(
            backend.generate_url(),
            "https://example.test/functions/v1/ask-guide"
        );
        assert_eq!(
            backend.synthesize_url(),
            "https://example.test/functions/v1/text-to-speech"
        );
        assert_eq!(
            backend.transcribe_url(),
            "https://example.test/functions/v1/transcribe"
        );
    }

    #[test]
    fn overlay_fills_missing_fields_with_defaults() {
        let overlay = file::ConfigFile {
            backend: file::BackendFileConfig {
                url: None,
                anon_key: Some("file-key".to_string()),
            },
            ..Default::default()
        };

        let config = Config::from_overlay(overlay).unwrap();
        assert!(config.voice.enabled);
        assert_eq!(config.language, Language::En);
    }
}
