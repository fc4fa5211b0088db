//! Microphone input and utterance endpointing

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech for a usable utterance (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Trailing silence that ends an utterance (in samples)
const SILENCE_SAMPLES: usize = 12000; // 0.75 seconds

/// Captures audio from the default input device
pub struct MicInput {
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl MicInput {
    /// Create a new microphone input
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if no input device exists and
    /// [`Error::Audio`] if no 16kHz mono configuration is available.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Unsupported("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable capture config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "microphone input initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Unsupported("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "microphone capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("microphone capture started");
        Ok(())
    }

    /// Stop capturing and discard the stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("microphone capture stopped");
        }
    }

    /// Take the samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Clear any buffered samples
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Single-shot utterance endpointing over a live sample stream.
///
/// Accumulates from the first frame that crosses the energy threshold and
/// declares the utterance complete once enough speech has been followed by
/// sustained silence.
#[derive(Default)]
pub struct UtteranceDetector {
    speech_buffer: Vec<f32>,
    speech_samples: usize,
    silence_counter: usize,
    heard_speech: bool,
}

impl UtteranceDetector {
    /// Create a detector in its idle state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed captured samples; returns true once a complete utterance is held
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let is_speech = rms_energy(samples) > ENERGY_THRESHOLD;

        if !self.heard_speech {
            if !is_speech {
                return false;
            }
            self.heard_speech = true;
        }

        self.speech_buffer.extend_from_slice(samples);

        if is_speech {
            self.speech_samples += samples.len();
            self.silence_counter = 0;
        } else {
            self.silence_counter += samples.len();
        }

        self.is_complete()
    }

    /// Whether speech followed by sufficient silence has been captured
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.heard_speech
            && self.silence_counter > SILENCE_SAMPLES
            && self.speech_samples > MIN_SPEECH_SAMPLES
    }

    /// Whether any speech has been heard yet
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Take the accumulated utterance, resetting the detector
    pub fn take_utterance(&mut self) -> Vec<f32> {
        self.speech_samples = 0;
        self.silence_counter = 0;
        self.heard_speech = false;
        std::mem::take(&mut self.speech_buffer)
    }

    /// Reset to idle, discarding any accumulated audio
    pub fn reset(&mut self) {
        self.speech_buffer.clear();
        self.speech_samples = 0;
        self.silence_counter = 0;
        self.heard_speech = false;
    }
}

/// RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples to WAV bytes for the transcription backend
///
/// # Errors
///
/// Returns error if WAV encoding fails.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(duration_secs: f32, amplitude: f32) -> Vec<f32> {
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect()
    }

    fn silence(duration_secs: f32) -> Vec<f32> {
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
        vec![0.0; num_samples]
    }

    #[test]
    fn silence_alone_never_completes() {
        let mut detector = UtteranceDetector::new();
        assert!(!detector.process(&silence(2.0)));
        assert!(!detector.heard_speech());
        assert!(detector.take_utterance().is_empty());
    }

    #[test]
    fn speech_then_silence_completes() {
        let mut detector = UtteranceDetector::new();

        assert!(!detector.process(&sine(0.5, 0.3)));
        assert!(detector.heard_speech());

        let complete = detector.process(&silence(1.0));
        assert!(complete);

        let utterance = detector.take_utterance();
        assert!(!utterance.is_empty());
        assert!(!detector.heard_speech());
    }

    #[test]
    fn too_short_speech_does_not_complete() {
        let mut detector = UtteranceDetector::new();
        detector.process(&sine(0.05, 0.3));
        detector.process(&silence(1.0));
        assert!(!detector.is_complete());
    }

    #[test]
    fn reset_discards_accumulated_audio() {
        let mut detector = UtteranceDetector::new();
        detector.process(&sine(0.5, 0.3));
        detector.reset();
        assert!(detector.take_utterance().is_empty());
    }

    #[test]
    fn wav_encoding_produces_riff_header() {
        let samples = sine(0.1, 0.5);
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }
}
