//! Wake phrase detection
//!
//! Segments speech out of the idle audio stream by energy, transcribes each
//! completed segment, and posts a start trigger when the transcript contains
//! the wake phrase. Runs only while the assistant is idle; mid-turn audio
//! belongs to the utterance capture.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::collaborator::Transcriber;
use crate::orchestrator::{ConversationState, Trigger};
use crate::voice::CaptureBuffer;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to form a segment (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration that ends a segment (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// How often the watcher drains the capture buffer
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Segmentation state of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech energy
    Quiet,
    /// Accumulating a speech segment
    Tracking,
}

/// Segments candidate wake utterances out of an audio stream
pub struct WakeWordDetector {
    wake_phrases: Vec<String>,
    state: DetectorState,
    segment: Vec<f32>,
    silence_counter: usize,
}

impl WakeWordDetector {
    /// Create a detector for the given wake phrases (e.g. "hey aura")
    #[must_use]
    pub fn new(wake_phrases: Vec<String>) -> Self {
        let normalized: Vec<String> = wake_phrases
            .into_iter()
            .map(|w| w.to_lowercase().trim().to_string())
            .collect();

        tracing::debug!(wake_phrases = ?normalized, "wake phrase detector initialized");

        Self {
            wake_phrases: normalized,
            state: DetectorState::Quiet,
            segment: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed audio samples; returns a completed speech segment when enough
    /// speech followed by silence has accumulated
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = rms_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Quiet => {
                if is_speech {
                    self.state = DetectorState::Tracking;
                    self.segment.clear();
                    self.segment.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, tracking segment");
                }
                None
            }
            DetectorState::Tracking => {
                self.segment.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                // Trailing silence does not count toward the speech minimum
                let speech_len = self.segment.len().saturating_sub(self.silence_counter);
                if self.silence_counter > SILENCE_SAMPLES && speech_len > MIN_SPEECH_SAMPLES {
                    tracing::debug!(samples = self.segment.len(), "speech segment complete");
                    self.state = DetectorState::Quiet;
                    self.silence_counter = 0;
                    return Some(std::mem::take(&mut self.segment));
                }

                // Too much silence without enough speech: discard the segment
                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("segment abandoned, resetting");
                    self.reset();
                }

                None
            }
        }
    }

    /// Check whether a transcript contains any configured wake phrase
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();
        self.wake_phrases
            .iter()
            .any(|phrase| normalized.contains(phrase.as_str()))
    }

    /// Discard any partial segment and return to quiet
    pub fn reset(&mut self) {
        self.state = DetectorState::Quiet;
        self.segment.clear();
        self.silence_counter = 0;
    }

    /// Current segmentation state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Configured wake phrases
    #[must_use]
    pub fn wake_phrases(&self) -> &[String] {
        &self.wake_phrases
    }
}

/// Watch the idle audio stream and post a start trigger on the wake phrase
///
/// Pauses whenever the conversation leaves `Idle`; returns when the trigger
/// channel closes or the state channel's sender is dropped.
pub async fn watch_for_wake_phrase(
    mut detector: WakeWordDetector,
    buffer: CaptureBuffer,
    transcriber: Arc<dyn Transcriber>,
    triggers: mpsc::UnboundedSender<Trigger>,
    state_rx: watch::Receiver<ConversationState>,
) {
    let mut interval = tokio::time::interval(WATCH_INTERVAL);

    loop {
        interval.tick().await;

        if triggers.is_closed() || state_rx.has_changed().is_err() {
            tracing::debug!("wake watcher stopping");
            return;
        }

        if *state_rx.borrow() != ConversationState::Idle {
            // Mid-turn audio is the utterance capture's, not ours
            detector.reset();
            drop(buffer.take());
            continue;
        }

        let chunk = buffer.take();
        if chunk.is_empty() {
            continue;
        }

        let Some(segment) = detector.push(&chunk) else {
            continue;
        };

        match transcriber.transcribe(&segment).await {
            Ok(transcript) => {
                if detector.matches(&transcript) {
                    tracing::info!(transcript = %transcript, "wake phrase detected");
                    let _ = triggers.send(Trigger::Start);
                } else {
                    tracing::trace!(transcript = %transcript, "no wake phrase in segment");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "wake segment transcription failed");
            }
        }
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(rms_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(rms_energy(&loud) > 0.4);
    }

    #[test]
    fn test_wake_phrase_matching() {
        let detector = WakeWordDetector::new(vec!["hey aura".to_string()]);

        assert!(!detector.matches("hello world"));
        assert!(detector.matches("Hey Aura, what's up?"));
        assert!(detector.matches("HEY AURA"));
    }
}
