//! Remote speech-to-text client

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::CredentialResolver;
use crate::voice::Language;
use crate::{Error, Result};

/// Successful response from the transcription backend
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes captured speech via the remote backend
pub struct SpeechToText {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<CredentialResolver>,
}

impl SpeechToText {
    /// Create a transcription client targeting the given endpoint
    #[must_use]
    pub fn new(endpoint: String, credentials: Arc<CredentialResolver>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            credentials,
        }
    }

    /// Transcribe WAV audio to text
    ///
    /// The request races the cancellation token; an aborted session drops
    /// the transcription without producing a transcript.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stt`] on backend failure, [`Error::Recognition`]
    /// when the session was cancelled mid-request.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        language: Language,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tracing::debug!(
            audio_bytes = audio.len(),
            language = language.stt_code(),
            "starting transcription"
        );

        let cred = self.credentials.resolve().await;

        let form = reqwest::multipart::Form::new()
            .part(
                "audio",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("utterance.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("language", language.stt_code());

        let request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", cred.bearer))
            .header("apikey", &cred.api_key)
            .multipart(form)
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => {
                return Err(Error::Recognition("session aborted".to_string()));
            }
            result = request => result.map_err(|e| Error::Stt(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription backend error");
            return Err(Error::Stt(format!("transcription failed {status}: {body}")));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| Error::Stt(e.to_string()))?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
