//! Audio playback to speakers
//!
//! Playback blocks its caller (always a worker thread) and honors a shared
//! stop flag checked every output buffer, which is what makes speech
//! interruptible mid-playback.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use crate::{Error, Result};

/// Plays audio through the default output device
///
/// Holds no device handle; the stream is opened per call so the whole type
/// stays `Send` and can live inside a worker.
#[derive(Clone, Default)]
pub struct AudioPlayback;

impl AudioPlayback {
    /// Create a playback instance, verifying an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self)
    }

    /// Play samples, blocking until completion or until `stop` is set
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    #[allow(clippy::unused_self)]
    pub fn play_blocking(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
        stop: Arc<AtomicBool>,
    ) -> Result<()> {
        if samples.is_empty() || stop.load(Ordering::SeqCst) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                (c.channels() == 1 || c.channels() == 2)
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = config.channels as usize;

        let sample_count = samples.len();
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let cb_position = Arc::clone(&position);
        let cb_finished = Arc::clone(&finished);
        let cb_stop = Arc::clone(&stop);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if cb_stop.load(Ordering::Relaxed) {
                        cb_finished.store(true, Ordering::Relaxed);
                        data.fill(0.0);
                        return;
                    }

                    let mut pos = cb_position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = if pos < samples.len() {
                            let s = samples[pos];
                            pos += 1;
                            s
                        } else {
                            cb_finished.store(true, Ordering::Relaxed);
                            0.0
                        };
                        frame.fill(sample);
                    }
                    cb_position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Bound the wait by the audio duration plus a margin in case the
        // device stalls
        let duration_ms = (sample_count as u64 * 1000) / u64::from(sample_rate);
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) && !stop.load(Ordering::Relaxed) {
            if std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(std::time::Duration::from_millis(100));

        drop(stream);

        if stop.load(Ordering::Relaxed) {
            tracing::debug!("playback stopped early");
        } else {
            tracing::debug!(samples = sample_count, "playback complete");
        }

        Ok(())
    }
}

/// Decode WAV bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the WAV data cannot be decoded
pub fn wav_to_samples(wav_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(wav_data))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = f32::from(i16::MAX);
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?,
    };

    let mono = if spec.channels == 2 {
        samples
            .chunks(2)
            .map(|frame| f32::midpoint(frame[0], frame.get(1).copied().unwrap_or(frame[0])))
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}
