//! Spoken playback of synthesized answers
//!
//! [`SpeechPlayback`] drives one fetch-and-play cycle at a time through an
//! `Idle -> Loading -> Playing -> Idle` state machine. Every exit path —
//! success, failure, cancellation, text change, drop — releases the full
//! resource bundle (in-flight request, decoded audio, output stream).

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::voice::tts::SpeechSynthesis;
use crate::{Error, Result};

/// Sample rate for playback (matches the synthesis backend's MP3 output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Playback state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing held, nothing playing
    #[default]
    Idle,
    /// Audio fetch in flight
    Loading,
    /// Audio playing
    Playing,
}

/// Output seam: decode and play one audio payload
pub trait AudioSink {
    /// Decode `audio` and begin playback
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlaybackDecode`] if the payload cannot be decoded
    /// or the output stream cannot be started.
    fn start(&mut self, audio: &[u8]) -> Result<()>;

    /// Stop playback and release the output stream; idempotent
    fn stop(&mut self);

    /// Whether the last started payload has played to its natural end
    fn is_finished(&self) -> bool;
}

/// Resource bundle for one fetch-and-play cycle
struct ActiveCycle {
    text: String,
    cancel: CancellationToken,
    /// Pending synthesis fetch; resolved by [`SpeechPlayback::poll`]
    fetch: oneshot::Receiver<Result<Vec<u8>>>,
    /// Raw audio payload, held exclusively for the lifetime of the cycle
    audio: Option<Vec<u8>>,
}

type FailureCallback = Box<dyn FnMut(&Error)>;

/// Fetches synthesized speech for a text and plays it
pub struct SpeechPlayback<S: AudioSink> {
    synthesis: SpeechSynthesis,
    sink: S,
    state: PlaybackState,
    active: Option<ActiveCycle>,
    on_failure: Option<FailureCallback>,
}

impl<S: AudioSink> SpeechPlayback<S> {
    /// Create a playback component in the idle state
    #[must_use]
    pub fn new(synthesis: SpeechSynthesis, sink: S) -> Self {
        Self {
            synthesis,
            sink,
            state: PlaybackState::Idle,
            active: None,
            on_failure: None,
        }
    }

    /// Set the callback invoked exactly once per genuine failure.
    ///
    /// Caller-initiated cancellations never invoke it.
    #[must_use]
    pub fn on_failure(mut self, f: impl FnMut(&Error) + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether a cycle is loading
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, PlaybackState::Loading)
    }

    /// Whether audio is playing
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing)
    }

    /// Whether a resource bundle is currently held
    #[must_use]
    pub const fn holds_resources(&self) -> bool {
        self.active.is_some()
    }

    /// Start a cycle for `text` if idle, stop the active cycle otherwise.
    ///
    /// During `Loading` this cancels the in-flight fetch; during `Playing`
    /// it stops the audio. Either way the component ends `Idle`.
    pub fn toggle(&mut self, text: &str) {
        if matches!(self.state, PlaybackState::Idle) {
            self.begin(text);
        } else {
            self.stop();
        }
    }

    /// Stop and release everything, cancelling any in-flight fetch.
    ///
    /// Callable any number of times from any state, always ends in `Idle`
    /// with no held resources.
    pub fn stop(&mut self) {
        if let Some(cycle) = self.active.take() {
            cycle.cancel.cancel();
            tracing::debug!(text_len = cycle.text.len(), "playback cycle stopped");
        }
        self.sink.stop();
        self.state = PlaybackState::Idle;
    }

    /// Invalidate the active cycle if the text to speak has changed.
    ///
    /// Stale audio for the old text must never play, so the old cycle is
    /// fully stopped before any new one may start.
    pub fn text_changed(&mut self, new_text: &str) {
        if self
            .active
            .as_ref()
            .is_some_and(|cycle| cycle.text != new_text)
        {
            self.stop();
        }
    }

    /// Advance the state machine.
    ///
    /// During `Loading` a resolved fetch moves to `Playing` (or releases on
    /// failure); during `Playing` the natural end of audio returns to
    /// `Idle` without user action.
    pub fn poll(&mut self) {
        match self.state {
            PlaybackState::Idle => {}
            PlaybackState::Loading => self.poll_loading(),
            PlaybackState::Playing => {
                if self.sink.is_finished() {
                    tracing::debug!("playback finished");
                    self.release();
                }
            }
        }
    }

    /// Begin a fetch-and-play cycle for `text`.
    ///
    /// The fetch runs in its own task so the host stays free to call
    /// `stop()` or `toggle()` while audio loads; `poll()` picks up the
    /// result.
    fn begin(&mut self, text: &str) {
        // One resource bundle at a time: release any predecessor first
        self.stop();

        self.state = PlaybackState::Loading;
        let cancel = CancellationToken::new();
        let (done, fetch) = oneshot::channel();

        let synthesis = self.synthesis.clone();
        let task_cancel = cancel.clone();
        let task_text = text.to_string();
        tokio::spawn(async move {
            let result = synthesis.fetch(&task_text, &task_cancel).await;
            // A stopped cycle has dropped the receiver; nothing to deliver
            let _ = done.send(result);
        });

        self.active = Some(ActiveCycle {
            text: text.to_string(),
            cancel,
            fetch,
            audio: None,
        });
    }

    /// Resolve a pending fetch. Failures are classified and notified,
    /// never propagated to the caller.
    fn poll_loading(&mut self) {
        use oneshot::error::TryRecvError;

        let Some(cycle) = &mut self.active else {
            return;
        };

        let outcome = match cycle.fetch.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Closed) => {
                Err(Error::PlaybackFetch("synthesis task vanished".to_string()))
            }
        };

        match outcome {
            Ok(audio) => match self.sink.start(&audio) {
                Ok(()) => {
                    if let Some(cycle) = &mut self.active {
                        cycle.audio = Some(audio);
                    }
                    self.state = PlaybackState::Playing;
                }
                Err(e) => {
                    self.notify_failure(&e);
                    self.release();
                }
            },
            Err(e) if e.is_cancellation() => {
                self.release();
            }
            Err(e) => {
                self.notify_failure(&e);
                self.release();
            }
        }
    }

    /// Release the bundle and return to `Idle`
    fn release(&mut self) {
        self.active = None;
        self.sink.stop();
        self.state = PlaybackState::Idle;
    }

    fn notify_failure(&mut self, error: &Error) {
        tracing::error!(error = %error, "playback failure");
        if let Some(on_failure) = &mut self.on_failure {
            on_failure(error);
        }
    }
}

impl<S: AudioSink> Drop for SpeechPlayback<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Plays decoded MP3 audio on the default output device
pub struct CpalSink {
    config: StreamConfig,
    stream: Option<Stream>,
    finished: Arc<AtomicBool>,
}

impl CpalSink {
    /// Create a sink on the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device or suitable configuration exists.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: stereo output
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio sink initialized"
        );

        Ok(Self {
            config,
            stream: None,
            finished: Arc::new(AtomicBool::new(true)),
        })
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self, audio: &[u8]) -> Result<()> {
        self.stop();

        let samples = decode_mp3(audio)?;
        if samples.is_empty() {
            return Err(Error::PlaybackDecode("decoded audio is empty".to_string()));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::PlaybackDecode("no output device".to_string()))?;

        let channels = self.config.channels as usize;
        let finished = Arc::new(AtomicBool::new(false));
        let finished_cb = Arc::clone(&finished);
        let mut pos = 0usize;

        let stream = device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = if pos < samples.len() {
                            let s = samples[pos];
                            pos += 1;
                            s
                        } else {
                            finished_cb.store(true, Ordering::Relaxed);
                            0.0
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio output error");
                },
                None,
            )
            .map_err(|e| Error::PlaybackDecode(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::PlaybackDecode(e.to_string()))?;

        self.stream = Some(stream);
        self.finished = finished;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio output stopped");
        }
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Decode MP3 bytes to f32 samples, stereo averaged to mono
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        (left + right) / 2.0
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::PlaybackDecode(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_decode() {
        let result = decode_mp3(&[0xde, 0xad, 0xbe, 0xef]);
        // minimp3 skips junk until EOF, yielding no samples
        match result {
            Ok(samples) => assert!(samples.is_empty()),
            Err(e) => assert!(matches!(e, Error::PlaybackDecode(_))),
        }
    }
}
