//! Ollama `/api/chat` client
//!
//! Requests are non-streaming with `"format": "json"` so the model's reply
//! is a single JSON decision object.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{BackendError, ChatMessage, GenerationBackend};

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    eval_duration: u64,
}

/// Client for Ollama's /api/chat endpoint
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - Ollama server, e.g. `http://localhost:11434`
    /// * `model` - The model name (e.g., "llama3.2")
    /// * `timeout` - Upper bound on one generation request
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: 0.2,
            client,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": self.temperature
            }
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .json(&self.request_body(messages))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!("HTTP {}: {}", status, text)));
        }
        if text.is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        debug!(
            model = %self.model,
            eval_count = chat_response.eval_count,
            eval_duration_ms = chat_response.eval_duration / 1_000_000,
            "Generation complete"
        );

        if chat_response.message.content.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(chat_response.message.content)
    }
}
