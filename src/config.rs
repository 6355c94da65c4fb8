//! Configuration management for the Aura assistant

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::Result;

/// Default personality prompt sent as the system message
const DEFAULT_SYSTEM_PROMPT: &str = "You are Aura, a friendly and helpful voice assistant \
living on a small device. You have an expressive animated face and enjoy helping with tasks. \
Keep responses concise (1-3 sentences) since you'll be speaking them aloud. \
Be warm, slightly playful, and helpful.";

/// Aura assistant configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Phrase that activates the assistant from idle
    pub wake_phrase: String,

    /// Render/input loop cadence in frames per second
    pub fps: u32,

    /// Microphone capture settings
    pub audio: AudioConfig,

    /// Speech-to-text backend settings
    pub stt: SttConfig,

    /// Language model backend settings
    pub llm: LlmConfig,

    /// Speech synthesis backend settings
    pub tts: TtsConfig,

    /// Per-stage deadline settings
    pub timeouts: TimeoutConfig,
}

/// Microphone capture settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    /// Maximum utterance length in seconds
    pub max_utterance_secs: f32,

    /// Trailing silence that ends an utterance, in seconds
    pub silence_secs: f32,

    /// RMS energy below which a chunk counts as silence
    pub silence_threshold: f32,
}

/// Speech-to-text backend settings
///
/// Points at an OpenAI-compatible `/v1/audio/transcriptions` endpoint,
/// typically a local whisper server. With no URL configured the transcriber
/// runs in placeholder mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SttConfig {
    /// Transcription server base URL (e.g. `http://localhost:8080`)
    pub server_url: Option<String>,

    /// Model identifier sent with each request
    pub model: String,
}

/// Language model backend settings (Ollama)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Ollama server base URL
    pub host: String,

    /// Model identifier (e.g. "qwen2:0.5b")
    pub model: String,

    /// System prompt establishing the assistant personality
    pub system_prompt: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens per reply; short replies speak faster on small hosts
    pub num_predict: u32,

    /// Context window size
    pub num_ctx: u32,
}

/// Speech synthesis backend settings
///
/// Points at a local Piper HTTP server returning WAV audio. With no URL
/// configured the speaker falls back to tone playback.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TtsConfig {
    /// Synthesis server base URL (e.g. `http://localhost:5000`)
    pub server_url: Option<String>,

    /// Voice identifier (e.g. "en_US-lessac-medium")
    pub voice: String,

    /// Speech speed multiplier (0.5 to 2.0)
    pub speed: f64,
}

/// Per-stage deadline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Deadline for the capture+transcribe stage, in seconds
    pub listen_secs: u64,

    /// Deadline for the respond stage, in seconds
    pub respond_secs: u64,

    /// Grace period awaited for an outstanding worker at shutdown, in seconds
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_phrase: "hey aura".to_string(),
            fps: 30,
            audio: AudioConfig::default(),
            stt: SttConfig::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_utterance_secs: 10.0,
            silence_secs: 1.5,
            silence_threshold: 0.015,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            model: "whisper-1".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "qwen2:0.5b".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            num_predict: 75,
            num_ctx: 512,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            voice: "en_US-lessac-medium".to_string(),
            speed: 1.0,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            listen_secs: 20,
            respond_secs: 120,
            shutdown_grace_secs: 2,
        }
    }
}

impl TimeoutConfig {
    /// Deadline for the capture+transcribe stage
    #[must_use]
    pub const fn listen(&self) -> Duration {
        Duration::from_secs(self.listen_secs)
    }

    /// Deadline for the respond stage
    #[must_use]
    pub const fn respond(&self) -> Duration {
        Duration::from_secs(self.respond_secs)
    }

    /// Grace period awaited for an outstanding worker at shutdown
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Config {
    /// Load configuration from `aura.toml` (if present) with environment
    /// variable overrides applied on top
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be parsed
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?.unwrap_or_default();
        config.apply_env();
        Ok(config)
    }

    /// Read `aura.toml` from the user config dir or the working directory
    fn load_file() -> Result<Option<Self>> {
        let candidates = [
            directories::ProjectDirs::from("dev", "aura", "aura")
                .map(|d| d.config_dir().join("aura.toml")),
            Some(PathBuf::from("aura.toml")),
        ];

        for path in candidates.into_iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                let config: Self = toml::from_str(&content)?;
                tracing::info!(path = %path.display(), "loaded config file");
                return Ok(Some(config));
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        if let Ok(phrase) = std::env::var("AURA_WAKE_PHRASE") {
            self.wake_phrase = phrase;
        }
        if let Some(fps) = env_parse("AURA_FPS") {
            self.fps = fps;
        }
        if let Ok(url) = std::env::var("AURA_STT_URL") {
            self.stt.server_url = Some(url);
        }
        if let Ok(model) = std::env::var("AURA_STT_MODEL") {
            self.stt.model = model;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            self.llm.host = host;
        }
        if let Ok(model) = std::env::var("AURA_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(prompt) = std::env::var("AURA_SYSTEM_PROMPT") {
            self.llm.system_prompt = prompt;
        }
        if let Ok(url) = std::env::var("AURA_TTS_URL") {
            self.tts.server_url = Some(url);
        }
        if let Ok(voice) = std::env::var("AURA_TTS_VOICE") {
            self.tts.voice = voice;
        }
        if let Some(speed) = env_parse("AURA_TTS_SPEED") {
            self.tts.speed = speed;
        }
        if let Some(secs) = env_parse("AURA_LISTEN_TIMEOUT_SECS") {
            self.timeouts.listen_secs = secs;
        }
        if let Some(secs) = env_parse("AURA_RESPOND_TIMEOUT_SECS") {
            self.timeouts.respond_secs = secs;
        }
    }
}

/// Parse an environment variable, ignoring unset or malformed values
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.wake_phrase, "hey aura");
        assert_eq!(config.fps, 30);
        assert!(config.stt.server_url.is_none());
        assert_eq!(config.timeouts.listen(), Duration::from_secs(20));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            wake_phrase = "hey max"

            [llm]
            model = "llama3.2:1b"
            "#,
        )
        .unwrap();

        assert_eq!(config.wake_phrase, "hey max");
        assert_eq!(config.llm.model, "llama3.2:1b");
        // Untouched sections keep their defaults
        assert_eq!(config.fps, 30);
        assert_eq!(config.tts.voice, "en_US-lessac-medium");
    }
}
