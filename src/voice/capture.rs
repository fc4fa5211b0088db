//! Voice capture sessions
//!
//! [`VoiceCapture`] turns a speech recognizer into a single-shot
//! start/stop/toggle session with one final-transcript callback. The
//! recognizer itself sits behind the [`Recognizer`] trait so the state
//! machine is testable without audio hardware; the production
//! implementation ([`MicRecognizer`]) combines microphone capture,
//! utterance endpointing and the remote transcription backend.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::voice::mic::{samples_to_wav, MicInput, UtteranceDetector, SAMPLE_RATE};
use crate::voice::stt::SpeechToText;
use crate::voice::Language;
use crate::{Error, Result};

/// Events emitted by a recognizer session.
///
/// Every session path funnels through these three variants, consumed by
/// the single dispatch point in [`VoiceCapture::pump`].
#[derive(Debug)]
pub enum RecognizerEvent {
    /// Recognition produced a (possibly empty or missing) transcript
    Result {
        /// Top transcript, if any alternative was produced
        transcript: Option<String>,
    },
    /// The recognizer failed; no transcript follows
    Error(String),
    /// The session ended, whatever the path
    Ended,
}

/// A speech recognizer capable of running one session at a time.
///
/// `stop` and `abort` are deliberately distinct: stop is graceful and an
/// in-progress result may still land on the session channel, abort is hard
/// and drops any in-flight result.
pub trait Recognizer {
    /// Whether the host environment supports recognition at all
    fn is_supported(&self) -> bool;

    /// Begin a session, emitting events on `events`
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be started.
    fn start(
        &mut self,
        language: Language,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    ) -> Result<()>;

    /// Request a graceful stop; a pending result may still be delivered
    fn stop(&mut self);

    /// Hard-cancel the session; in-flight results are dropped
    fn abort(&mut self);

    /// Drive session progress; called from the host loop
    fn poll(&mut self);
}

type TranscriptCallback = Box<dyn FnMut(String)>;
type ErrorCallback = Box<dyn FnMut(String)>;

/// Single-shot voice capture session over a [`Recognizer`]
pub struct VoiceCapture {
    recognizer: Box<dyn Recognizer>,
    supported: bool,
    listening: bool,
    events: Option<mpsc::UnboundedReceiver<RecognizerEvent>>,
    on_transcript: TranscriptCallback,
    on_error: Option<ErrorCallback>,
}

impl VoiceCapture {
    /// Wrap a recognizer; support is evaluated once and treated as static
    /// for the component's lifetime.
    #[must_use]
    pub fn new(recognizer: Box<dyn Recognizer>) -> Self {
        let supported = recognizer.is_supported();
        Self {
            recognizer,
            supported,
            listening: false,
            events: None,
            on_transcript: Box::new(|_| {}),
            on_error: None,
        }
    }

    /// Set the final-transcript callback
    #[must_use]
    pub fn on_transcript(mut self, f: impl FnMut(String) + 'static) -> Self {
        self.on_transcript = Box::new(f);
        self
    }

    /// Set the optional recognizer-error callback
    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(String) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Whether recognition is available in this environment
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.supported
    }

    /// Whether a session is currently listening
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Start a capture session for the given language.
    ///
    /// No-op when unsupported. Any existing session is aborted first, so
    /// two recognitions can never run concurrently.
    pub fn start(&mut self, language: Language) {
        if !self.supported {
            return;
        }

        self.abort();

        let locale = language.locale();
        tracing::debug!(locale, "starting capture session");

        let (tx, rx) = mpsc::unbounded_channel();
        match self.recognizer.start(language, tx) {
            Ok(()) => {
                self.events = Some(rx);
                self.listening = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "recognizer failed to start");
                if let Some(on_error) = &mut self.on_error {
                    on_error(e.to_string());
                }
            }
        }
    }

    /// Request a graceful stop; a pending result may still arrive via
    /// [`pump`](Self::pump).
    pub fn stop(&mut self) {
        self.recognizer.stop();
        self.listening = false;
    }

    /// Hard-cancel the active session.
    ///
    /// The session event channel is dropped wholesale, so nothing from the
    /// torn-down session can reach the callbacks afterwards.
    pub fn abort(&mut self) {
        self.recognizer.abort();
        self.events = None;
        self.listening = false;
    }

    /// Start if idle, stop if listening
    pub fn toggle(&mut self, language: Language) {
        if self.listening {
            self.stop();
        } else {
            self.start(language);
        }
    }

    /// Drive the recognizer and dispatch any pending session events
    pub fn pump(&mut self) {
        self.recognizer.poll();

        let Some(rx) = &mut self.events else {
            return;
        };

        let mut session_over = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                RecognizerEvent::Result { transcript } => {
                    self.listening = false;
                    match transcript {
                        // Empty or missing results are an intentional
                        // no-op, not an error
                        Some(text) if !text.trim().is_empty() => (self.on_transcript)(text),
                        _ => tracing::debug!("empty recognition result ignored"),
                    }
                }
                RecognizerEvent::Error(message) => {
                    self.listening = false;
                    tracing::warn!(error = %message, "recognizer error");
                    if let Some(on_error) = &mut self.on_error {
                        on_error(message);
                    }
                }
                RecognizerEvent::Ended => {
                    self.listening = false;
                    session_over = true;
                }
            }
        }

        if session_over {
            self.events = None;
        }
    }
}

impl Drop for VoiceCapture {
    fn drop(&mut self) {
        // Hard cancel on disposal: no callback may fire afterwards
        self.recognizer.abort();
    }
}

/// Active microphone recognition session state
struct MicSession {
    language: Language,
    events: mpsc::UnboundedSender<RecognizerEvent>,
    cancel: CancellationToken,
    transcribing: bool,
}

/// Production recognizer: microphone capture, energy endpointing, remote
/// transcription.
pub struct MicRecognizer {
    mic: Option<MicInput>,
    detector: UtteranceDetector,
    stt: Arc<SpeechToText>,
    session: Option<MicSession>,
}

impl MicRecognizer {
    /// Create a recognizer; an environment without a usable input device
    /// yields an unsupported recognizer whose operations are no-ops.
    #[must_use]
    pub fn new(stt: Arc<SpeechToText>) -> Self {
        let mic = match MicInput::new() {
            Ok(mic) => Some(mic),
            Err(e) => {
                tracing::warn!(error = %e, "microphone unavailable, capture unsupported");
                None
            }
        };

        Self {
            mic,
            detector: UtteranceDetector::new(),
            stt,
            session: None,
        }
    }

    /// Hand the accumulated utterance to the transcription backend.
    ///
    /// The spawned task is guarded by the session's cancellation token so
    /// `abort` drops an in-flight result.
    fn dispatch_transcription(&mut self, samples: Vec<f32>) {
        let Some(session) = &mut self.session else {
            return;
        };
        session.transcribing = true;

        let tx = session.events.clone();
        let cancel = session.cancel.clone();
        let language = session.language;
        let stt = Arc::clone(&self.stt);

        tokio::spawn(async move {
            let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
                Ok(wav) => wav,
                Err(e) => {
                    let _ = tx.send(RecognizerEvent::Error(e.to_string()));
                    let _ = tx.send(RecognizerEvent::Ended);
                    return;
                }
            };

            match stt.transcribe(wav, language, &cancel).await {
                Ok(text) => {
                    let _ = tx.send(RecognizerEvent::Result {
                        transcript: Some(text),
                    });
                }
                // Session was aborted mid-request: drop silently
                Err(Error::Recognition(_)) => {}
                Err(e) => {
                    let _ = tx.send(RecognizerEvent::Error(e.to_string()));
                }
            }
            let _ = tx.send(RecognizerEvent::Ended);
        });
    }
}

impl Recognizer for MicRecognizer {
    fn is_supported(&self) -> bool {
        self.mic.is_some()
    }

    fn start(
        &mut self,
        language: Language,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    ) -> Result<()> {
        self.abort();

        let Some(mic) = &mut self.mic else {
            return Err(Error::Unsupported("no input device".to_string()));
        };

        self.detector.reset();
        mic.clear_buffer();
        mic.start()?;

        self.session = Some(MicSession {
            language,
            events,
            cancel: CancellationToken::new(),
            transcribing: false,
        });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if session.transcribing {
            // Graceful stop: the pending result is allowed to land
            return;
        }

        if let Some(mic) = &mut self.mic {
            mic.stop();
        }

        if self.detector.heard_speech() {
            let samples = self.detector.take_utterance();
            self.dispatch_transcription(samples);
        } else {
            self.detector.reset();
            let events = session.events.clone();
            let _ = events.send(RecognizerEvent::Result { transcript: None });
            let _ = events.send(RecognizerEvent::Ended);
            self.session = None;
        }
    }

    fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
        if let Some(mic) = &mut self.mic {
            mic.stop();
        }
        self.detector.reset();
    }

    fn poll(&mut self) {
        let transcribing = self
            .session
            .as_ref()
            .is_none_or(|session| session.transcribing);
        if transcribing {
            return;
        }

        let Some(mic) = &self.mic else {
            return;
        };
        if !mic.is_capturing() {
            return;
        }

        let samples = mic.take_buffer();
        if samples.is_empty() {
            return;
        }

        if self.detector.process(&samples) {
            let utterance = self.detector.take_utterance();
            if let Some(mic) = &mut self.mic {
                mic.stop();
            }
            self.dispatch_transcription(utterance);
        }
    }
}

impl Drop for MicRecognizer {
    fn drop(&mut self) {
        self.abort();
    }
}
