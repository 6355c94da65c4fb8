//! Speech synthesis and playback
//!
//! Synthesizes replies through a local Piper HTTP server and plays the
//! resulting WAV through the speakers. An unavailable synthesizer degrades
//! to a short acknowledgement tone so the user still hears the turn end.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::collaborator::Speaker;
use crate::config::TtsConfig;
use crate::voice::{AudioPlayback, wav_to_samples};
use crate::{Error, Result};

/// Sample rate of the fallback tone
const TONE_SAMPLE_RATE: u32 = 22050;

/// Client for a Piper-style HTTP synthesis server
pub struct PiperClient {
    client: reqwest::Client,
    base_url: String,
    voice: String,
    speed: f64,
}

impl PiperClient {
    /// Create a synthesis client
    #[must_use]
    pub fn new(base_url: &str, voice: String, speed: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            voice,
            speed,
        }
    }

    /// Synthesize text to WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the synthesis server fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        // Piper expresses speed as length_scale, the inverse of a rate
        // multiplier
        let length_scale = (1.0 / self.speed.clamp(0.5, 2.0)).to_string();

        let response = self
            .client
            .post(&self.base_url)
            .query(&[
                ("voice", self.voice.as_str()),
                ("length_scale", length_scale.as_str()),
            ])
            .header("Content-Type", "text/plain")
            .body(text.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

/// Speaks replies aloud, interruptible via [`Speaker::stop`]
pub struct PiperSpeaker {
    synth: Option<PiperClient>,
    playback: AudioPlayback,
    stop: Arc<AtomicBool>,
}

impl PiperSpeaker {
    /// Create a speaker from config
    ///
    /// With no synthesis server configured, replies degrade to the fallback
    /// tone.
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let synth = match &config.server_url {
            Some(url) => {
                tracing::info!(url = %url, voice = %config.voice, "synthesis server configured");
                Some(PiperClient::new(url, config.voice.clone(), config.speed))
            }
            None => {
                tracing::warn!("no synthesis server configured, using tone fallback");
                None
            }
        };

        Ok(Self {
            synth,
            playback: AudioPlayback::new()?,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl Speaker for PiperSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        self.stop.store(false, Ordering::SeqCst);

        let (samples, sample_rate) = match &self.synth {
            Some(client) => match client.synthesize(text).await {
                Ok(wav) => wav_to_samples(&wav)?,
                Err(e) => {
                    tracing::warn!(error = %e, "synthesis failed, falling back to tone");
                    acknowledgement_tone()
                }
            },
            None => acknowledgement_tone(),
        };

        let playback = self.playback.clone();
        let stop = Arc::clone(&self.stop);
        tokio::task::spawn_blocking(move || playback.play_blocking(samples, sample_rate, stop))
            .await
            .map_err(|e| Error::Tts(format!("playback task failed: {e}")))??;

        Ok(())
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Two short beeps marking the turn boundary when synthesis is unavailable
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn acknowledgement_tone() -> (Vec<f32>, u32) {
    fn beep(frequency: f32, duration_secs: f32) -> impl Iterator<Item = f32> {
        let num_samples = (TONE_SAMPLE_RATE as f32 * duration_secs) as usize;
        (0..num_samples).map(move |i| {
            let t = i as f32 / TONE_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.2
        })
    }

    let gap = (TONE_SAMPLE_RATE as f32 * 0.08) as usize;

    let mut samples: Vec<f32> = beep(660.0, 0.12).collect();
    samples.extend(std::iter::repeat_n(0.0, gap));
    samples.extend(beep(880.0, 0.12));

    (samples, TONE_SAMPLE_RATE)
}
