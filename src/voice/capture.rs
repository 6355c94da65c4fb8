//! Audio capture from the microphone
//!
//! The cpal stream is not `Send`, so it stays on the control task; workers
//! and the wake watcher read through a shared [`CaptureBuffer`] handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::collaborator::Listener;
use crate::config::AudioConfig;
use crate::voice::rms_energy;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// How often utterance capture drains the shared buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shareable handle onto the capture stream's sample buffer
///
/// The stream callback appends; readers take or clear. Cloning the handle
/// shares the same underlying buffer.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<f32>>>);

impl CaptureBuffer {
    /// Take all samples accumulated since the last call
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.0
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Discard accumulated samples
    pub fn clear(&self) {
        if let Ok(mut buf) = self.0.lock() {
            buf.clear();
        }
    }

    fn push(&self, samples: &[f32]) {
        if let Ok(mut buf) = self.0.lock() {
            buf.extend_from_slice(samples);
        }
    }
}

/// Captures audio from the default input device into a [`CaptureBuffer`]
pub struct AudioCapture {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    buffer: CaptureBuffer,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: CaptureBuffer::default(),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = self.buffer.clone();
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer.push(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Shareable handle onto the sample buffer
    #[must_use]
    pub fn buffer(&self) -> CaptureBuffer {
        self.buffer.clone()
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Records one silence-endpointed utterance from the shared capture buffer
///
/// Recording ends after the configured trailing silence (once some speech
/// was heard) or at the maximum utterance length, whichever comes first.
pub struct MicListener {
    buffer: CaptureBuffer,
    audio: AudioConfig,
    stopped: AtomicBool,
}

impl MicListener {
    /// Create a listener reading from `buffer`
    #[must_use]
    pub const fn new(buffer: CaptureBuffer, audio: AudioConfig) -> Self {
        Self {
            buffer,
            audio,
            stopped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Listener for MicListener {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    async fn capture_utterance(&self) -> Result<Vec<f32>> {
        self.stopped.store(false, Ordering::SeqCst);
        self.buffer.clear();

        let max_samples = (self.audio.max_utterance_secs * SAMPLE_RATE as f32) as usize;
        let silence_limit = (self.audio.silence_secs * SAMPLE_RATE as f32) as usize;
        // Require a little audio before trailing silence can end the take
        let min_samples = SAMPLE_RATE as usize / 2;

        let mut utterance: Vec<f32> = Vec::new();
        let mut silence_samples = 0usize;

        tracing::debug!("recording utterance");

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            if self.stopped.load(Ordering::SeqCst) {
                tracing::debug!("capture stopped early");
                break;
            }

            let chunk = self.buffer.take();
            if chunk.is_empty() {
                continue;
            }

            if rms_energy(&chunk) < self.audio.silence_threshold {
                silence_samples += chunk.len();
            } else {
                silence_samples = 0;
            }
            utterance.extend_from_slice(&chunk);

            if utterance.len() >= max_samples {
                tracing::debug!(samples = utterance.len(), "max utterance length reached");
                break;
            }

            if silence_samples >= silence_limit && utterance.len() >= min_samples + silence_limit {
                tracing::debug!(samples = utterance.len(), "trailing silence detected");
                break;
            }
        }

        Ok(utterance)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Convert f32 samples to WAV bytes for STT requests
///
/// # Errors
///
/// Returns error if WAV encoding fails
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
            // Convert f32 [-1.0, 1.0] to i16
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
