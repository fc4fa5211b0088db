//! Speech synthesis client

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::CredentialResolver;
use crate::{Error, Result};

#[derive(serde::Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(rename = "voiceId")]
    voice_id: &'a str,
}

/// Fetches synthesized speech audio from the remote backend
#[derive(Clone)]
pub struct SpeechSynthesis {
    client: reqwest::Client,
    endpoint: String,
    voice_id: String,
    credentials: Arc<CredentialResolver>,
}

impl SpeechSynthesis {
    /// Create a synthesis client with a fixed voice identifier
    #[must_use]
    pub fn new(
        endpoint: String,
        voice_id: String,
        credentials: Arc<CredentialResolver>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            voice_id,
            credentials,
        }
    }

    /// Fetch the full audio payload for `text`.
    ///
    /// Firing `cancel` during the request or body read yields
    /// [`Error::PlaybackCancelled`], which callers treat as silent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlaybackFetch`] on non-success status or network
    /// failure, [`Error::PlaybackCancelled`] on caller abort.
    pub async fn fetch(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let cred = self.credentials.resolve().await;

        let body = SynthesisRequest {
            text,
            voice_id: &self.voice_id,
        };

        tracing::debug!(text_len = text.len(), voice = %self.voice_id, "fetching synthesis audio");

        let request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", cred.bearer))
            .header("apikey", &cred.api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(Error::PlaybackCancelled),
            result = request => result.map_err(|e| Error::PlaybackFetch(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %detail, "synthesis backend error");
            return Err(Error::PlaybackFetch(format!(
                "synthesis failed with status {status}: {detail}"
            )));
        }

        let audio = tokio::select! {
            () = cancel.cancelled() => return Err(Error::PlaybackCancelled),
            bytes = response.bytes() => bytes.map_err(|e| Error::PlaybackFetch(e.to_string()))?,
        };

        tracing::debug!(audio_bytes = audio.len(), "synthesis audio received");
        Ok(audio.to_vec())
    }
}
