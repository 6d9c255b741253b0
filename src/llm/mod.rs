//! Language-generation backend
//!
//! The reasoning loop treats the model as a single capability: a list of
//! chat messages in, one block of text out. Anything that can do that
//! (Ollama, a hosted API, a scripted test double) implements
//! `GenerationBackend`.

pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ollama::OllamaClient;

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant", "tool"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::with_role("tool", content)
    }

    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Error type for generation calls
#[derive(Debug)]
pub enum BackendError {
    Request(reqwest::Error),
    Parse(serde_json::Error),
    EmptyResponse,
    /// Backend reachable but refusing work (HTTP error, overload, test double)
    Unavailable(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Request(e) => write!(f, "Request error: {}", e),
            BackendError::Parse(e) => write!(f, "Parse error: {}", e),
            BackendError::EmptyResponse => write!(f, "Empty response from generation backend"),
            BackendError::Unavailable(msg) => write!(f, "Generation backend unavailable: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Request(e) => Some(e),
            BackendError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Request(e)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Parse(e)
    }
}

/// Prompt in, text out
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Model identifier, used as the `model` metric label
    fn model_name(&self) -> &str;

    /// Produce the next assistant message
    ///
    /// `messages[0]` is the system prompt; the rest is the question
    /// followed by the trajectory so far.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;
}
