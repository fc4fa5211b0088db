//! Streamed answer generation
//!
//! One cancellable HTTP request per call; decoded text accumulates in
//! arrival order and the consumer always sees the full text so far.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::auth::CredentialResolver;
use crate::{Error, Result};

/// Persona directive sent with every generation request
const SYSTEM_INSTRUCTION: &str = "You are a compassionate spiritual guide. \
Answer with warmth and clarity, keep responses concise, and phrase them so \
they sound natural when spoken aloud.";

#[derive(serde::Serialize)]
struct GenerateMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    messages: Vec<GenerateMessage<'a>>,
    system: &'static str,
}

/// Accumulates streamed bytes into monotonically growing UTF-8 text.
///
/// A multi-byte code point split across two network chunks is held back
/// until its remaining bytes arrive, so the visible text never contains
/// replacement characters for well-formed input.
#[derive(Default)]
struct Accumulator {
    text: String,
    pending: Vec<u8>,
}

impl Accumulator {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        match std::str::from_utf8(&self.pending) {
            Ok(valid) => {
                self.text.push_str(valid);
                self.pending.clear();
            }
            Err(e) => {
                let valid_len = e.valid_up_to();
                // Invalid sequences (not merely incomplete) are replaced so
                // the stream keeps flowing
                if e.error_len().is_some() {
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending));
                    self.pending.clear();
                } else {
                    self.text
                        .push_str(std::str::from_utf8(&self.pending[..valid_len]).unwrap_or(""));
                    self.pending.drain(..valid_len);
                }
            }
        }
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn finish(mut self) -> String {
        if !self.pending.is_empty() {
            self.text
                .push_str(&String::from_utf8_lossy(&self.pending));
        }
        self.text
    }
}

/// Issues cancellable streamed generation requests
pub struct StreamingGenerator {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<CredentialResolver>,
}

impl StreamingGenerator {
    /// Create a generator targeting the given endpoint
    #[must_use]
    pub fn new(endpoint: String, credentials: Arc<CredentialResolver>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            credentials,
        }
    }

    /// Generate an answer for `prompt`, streaming progress to `on_chunk`.
    ///
    /// `on_chunk` receives the full accumulated text after every network
    /// chunk, strictly in arrival order; the last invocation equals the
    /// returned final text. Firing `cancel` at any point stops the read
    /// loop, guarantees no further `on_chunk` calls, and yields
    /// [`Error::GenerationCancelled`] — distinguishable from genuine
    /// failures via [`Error::is_cancellation`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] on non-success status or network
    /// failure, [`Error::GenerationCancelled`] on caller abort.
    pub async fn generate<F>(
        &self,
        prompt: &str,
        mut on_chunk: F,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        // Credential resolution completes before the request is issued
        let cred = self.credentials.resolve().await;

        let body = GenerateRequest {
            messages: vec![GenerateMessage {
                role: "user",
                content: prompt,
            }],
            system: SYSTEM_INSTRUCTION,
        };

        tracing::debug!(prompt_len = prompt.len(), "starting generation request");

        let request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", cred.bearer))
            .header("apikey", &cred.api_key)
            .json(&body)
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(Error::GenerationCancelled),
            result = request => result.map_err(|e| Error::Generation(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %detail, "generation backend error");
            return Err(Error::Generation(format!(
                "generation failed with status {status}: {detail}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut acc = Accumulator::default();

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return Err(Error::GenerationCancelled),
                chunk = stream.next() => chunk,
            };

            match next {
                Some(Ok(bytes)) => {
                    acc.push(&bytes);
                    on_chunk(acc.text());
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "generation stream failed mid-read");
                    return Err(Error::Generation(e.to_string()));
                }
                None => break,
            }
        }

        let answer = acc.finish();
        tracing::debug!(answer_len = answer.len(), "generation complete");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_grows_monotonically() {
        let mut acc = Accumulator::default();
        let mut last_len = 0;

        for chunk in [&b"In the "[..], b"stillness ", b"of the mind"] {
            acc.push(chunk);
            assert!(acc.text().len() >= last_len);
            last_len = acc.text().len();
        }

        assert_eq!(acc.finish(), "In the stillness of the mind");
    }

    #[test]
    fn accumulator_holds_back_split_code_points() {
        // "ॐ" (U+0950) is e0 a5 90 in UTF-8; split it across chunks
        let bytes = "\u{950} shanti".as_bytes();
        let mut acc = Accumulator::default();

        acc.push(&bytes[..2]);
        assert_eq!(acc.text(), "");

        acc.push(&bytes[2..]);
        assert_eq!(acc.text(), "\u{950} shanti");
        assert_eq!(acc.finish(), "\u{950} shanti");
    }

    #[test]
    fn accumulator_replaces_invalid_sequences() {
        let mut acc = Accumulator::default();
        acc.push(&[0x68, 0x69, 0xff, 0x68]);
        assert!(acc.text().starts_with("hi"));
        assert!(acc.text().contains('\u{fffd}'));
    }
}
