//! Language model integration
//!
//! Talks to a local Ollama server for chat completions. When Ollama is
//! unreachable the responder degrades to canned conversational replies so
//! the assistant keeps working offline.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::collaborator::Responder;
use crate::config::LlmConfig;
use crate::history::Turn;
use crate::{Error, Result};

/// Chat message in Ollama's wire format
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Inference options tuned for small hosts: short replies speak faster and
/// a small context window keeps prompt evaluation cheap
#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    num_ctx: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

/// Client for a local Ollama server
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
    system_prompt: String,
    temperature: f32,
    num_predict: u32,
    num_ctx: u32,
    available: OnceCell<bool>,
}

impl OllamaClient {
    /// Create a client from config
    ///
    /// The backend is checked on first use (or an explicit [`probe`]); the
    /// result is latched for the process lifetime.
    ///
    /// [`probe`]: OllamaClient::probe
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            num_predict: config.num_predict,
            num_ctx: config.num_ctx,
            available: OnceCell::new(),
        }
    }

    /// Check whether Ollama is running and the configured model is present
    ///
    /// The check runs once and the answer is latched; an unreachable or
    /// model-less server leaves the client in degraded mode, where replies
    /// come from a canned set instead of the model.
    pub async fn probe(&self) -> bool {
        *self.available.get_or_init(|| self.check_backend()).await
    }

    /// Whether a probe has run and found a usable backend
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.get().copied().unwrap_or(false)
    }

    async fn check_backend(&self) -> bool {
        let url = format!("{}/api/tags", self.host);

        let response = match self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "ollama not reachable");
                tracing::warn!("start it with: ollama serve");
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "ollama tags endpoint failed");
            return false;
        }

        let tags: TagsResponse = match response.json().await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse ollama tags");
                return false;
            }
        };

        let base = self.model.split(':').next().unwrap_or(&self.model);
        let found = tags
            .models
            .iter()
            .any(|m| m.name.contains(&self.model) || m.name.starts_with(base));

        if found {
            tracing::info!(model = %self.model, "ollama connected, model available");
        } else {
            let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
            tracing::warn!(model = %self.model, available = ?names, "model not found");
            tracing::warn!("pull it with: ollama pull {}", self.model);
        }

        found
    }

    /// A canned reply for degraded (offline) mode, loosely matched to the
    /// user's text
    fn canned_reply(new_text: &str) -> String {
        let lowered = new_text.to_lowercase();
        let mut rng = rand::thread_rng();

        let choices: &[&str] = if lowered.contains("hello") || lowered.contains("hi") {
            &[
                "Hello there! I'm running in offline mode right now, but it's great to hear you.",
                "Hi! My language model is offline, but I'm still listening.",
            ]
        } else if lowered.contains("joke") {
            &[
                "Why do programmers prefer dark mode? Because light attracts bugs!",
                "I would tell you a UDP joke, but you might not get it.",
            ]
        } else if lowered.contains("how are you") {
            &[
                "I'm doing great! My circuits are humming nicely. How are you?",
                "Wonderful! Just sitting here, ticking along frame by frame.",
            ]
        } else if lowered.contains("name") {
            &["I'm Aura, your personal voice assistant living right here on this device."]
        } else {
            &[
                "That's an interesting question! My language model is offline right now, so my answers are limited.",
                "I'd need my language model running to give you a proper answer. For now, I'm doing my best!",
            ]
        };

        choices
            .choose(&mut rng)
            .copied()
            .unwrap_or(choices[0])
            .to_string()
    }
}

#[async_trait]
impl Responder for OllamaClient {
    async fn respond(&self, history: &[Turn], new_text: &str) -> Result<String> {
        if !self.probe().await {
            return Ok(Self::canned_reply(new_text));
        }

        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &self.system_prompt,
        });
        for turn in history {
            messages.push(ChatMessage {
                role: "user",
                content: &turn.user_text,
            });
            messages.push(ChatMessage {
                role: "assistant",
                content: &turn.assistant_text,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: new_text,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                top_p: 0.9,
                num_predict: self.num_predict,
                num_ctx: self.num_ctx,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("ollama error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        Ok(result.message.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_replies_match_patterns() {
        let reply = OllamaClient::canned_reply("tell me a joke");
        assert!(reply.contains("joke") || reply.contains("UDP"));

        let reply = OllamaClient::canned_reply("what is your name?");
        assert!(reply.contains("Aura"));
    }
}
