//! Speech-to-text transcription
//!
//! Uploads captured audio to an OpenAI-compatible transcription endpoint,
//! typically a local whisper server. With no server configured the
//! transcriber degrades to placeholder transcripts so the rest of the loop
//! stays demonstrable.

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::collaborator::Transcriber;
use crate::config::SttConfig;
use crate::voice::{SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Audio shorter than this (0.1s) is treated as nothing heard
const MIN_SAMPLES: usize = 1600;

/// Response from the transcription endpoint
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes speech via a whisper-compatible HTTP server
pub struct WhisperServer {
    client: reqwest::Client,
    server_url: Option<String>,
    model: String,
}

impl WhisperServer {
    /// Create a transcriber from config
    ///
    /// With no server URL the transcriber runs in placeholder mode.
    #[must_use]
    pub fn new(config: &SttConfig) -> Self {
        match &config.server_url {
            Some(url) => {
                tracing::info!(url = %url, model = %config.model, "transcription server configured");
            }
            None => {
                tracing::warn!("no transcription server configured, using placeholder transcripts");
            }
        }

        Self {
            client: reqwest::Client::new(),
            server_url: config
                .server_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperServer {
    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let Some(base) = &self.server_url else {
            return Ok(placeholder_transcript());
        };

        if samples.len() < MIN_SAMPLES {
            tracing::debug!(samples = samples.len(), "audio too short, skipping transcription");
            return Ok(String::new());
        }

        let wav = samples_to_wav(samples, SAMPLE_RATE)?;
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{base}/v1/audio/transcriptions"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription server error");
            return Err(Error::Stt(format!("transcription error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await?;
        let text = result.text.trim().to_string();

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}

/// A stand-in transcript for running without a transcription backend
fn placeholder_transcript() -> String {
    const PHRASES: &[&str] = &[
        "Hello, how are you today?",
        "What's the weather like?",
        "Tell me a joke",
        "What time is it?",
        "What's your name?",
    ];

    PHRASES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PHRASES[0])
        .to_string()
}
