//! Runtime configuration
//!
//! Every component owns a serde-defaulted config struct; `TutorConfig`
//! aggregates them. Sources, later wins:
//!
//! ```text
//!   built-in defaults ─► JSON file (--config) ─► environment overrides
//! ```
//!
//! Recognised environment variables: `TUTOR_MODEL`, `OLLAMA_URL`,
//! `TUTOR_PROFILE_DIR`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `BRAVE_SEARCH_API_KEY`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::LoopConfig;
use crate::policy::PolicyConfig;
use crate::safety::SafetyPolicy;
use crate::tools::{Confinement, SandboxLimits, SearchConfig};

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(serde_json::Error),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Failed to read {}: {}", path.display(), e),
            ConfigError::Parse(e) => write!(f, "Invalid config file: {}", e),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    /// Ollama model name
    pub model: String,
    /// Ollama server URL
    pub ollama_url: String,
    /// Upper bound on a single generation request
    pub generation_timeout_secs: u64,
    /// Directory for learner profiles (`~/.tutorloop/profiles` when unset)
    pub profile_dir: Option<PathBuf>,
    /// OTLP collector; traces are only exported when set
    pub otlp_endpoint: Option<String>,
    /// Console logs as JSON lines
    pub json_logs: bool,
    /// Interpreter used by the code sandbox
    pub python: String,
    pub reasoning: LoopConfig,
    pub safety: SafetyPolicy,
    pub sandbox: SandboxLimits,
    /// Kernel boundaries around sandboxed code
    pub confinement: Confinement,
    pub search: SearchConfig,
    pub policy: PolicyConfig,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            generation_timeout_secs: 120,
            profile_dir: None,
            otlp_endpoint: None,
            json_logs: false,
            python: "python3".to_string(),
            reasoning: LoopConfig::default(),
            safety: SafetyPolicy::default(),
            sandbox: SandboxLimits::default(),
            confinement: Confinement::strict(),
            search: SearchConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl TutorConfig {
    /// Defaults, then the optional JSON file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
                serde_json::from_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(model) = lookup("TUTOR_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.ollama_url = url;
        }
        if let Some(dir) = lookup("TUTOR_PROFILE_DIR") {
            self.profile_dir = Some(PathBuf::from(dir));
        }
        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
            self.otlp_endpoint = Some(endpoint);
        }
        if let Some(key) = lookup("BRAVE_SEARCH_API_KEY") {
            self.search.brave_api_key = Some(key);
        }
    }

    /// Reject settings the algorithms cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.policy;
        let invalid = |msg: String| Err(ConfigError::InvalidValue(msg));

        if !(p.alpha > 0.0 && p.alpha < 1.0) {
            return invalid(format!("policy.alpha must be in (0, 1), got {}", p.alpha));
        }
        if !(0.0..=1.0).contains(&p.low_threshold) || !(0.0..=1.0).contains(&p.high_threshold) {
            return invalid("policy thresholds must be in [0, 1]".to_string());
        }
        if p.low_threshold >= p.high_threshold {
            return invalid(format!(
                "policy.low_threshold ({}) must be below policy.high_threshold ({})",
                p.low_threshold, p.high_threshold
            ));
        }
        if p.streak_length == 0 {
            return invalid("policy.streak_length must be at least 1".to_string());
        }
        if !(p.exploration_decay > 0.0 && p.exploration_decay <= 1.0) {
            return invalid(format!(
                "policy.exploration_decay must be in (0, 1], got {}",
                p.exploration_decay
            ));
        }
        if !(0.0..=1.0).contains(&p.exploration_floor) || p.exploration_floor > p.initial_exploration {
            return invalid(format!(
                "policy.exploration_floor ({}) must be in [0, initial_exploration ({})]",
                p.exploration_floor, p.initial_exploration
            ));
        }
        if !(p.mastery_rate > 0.0 && p.mastery_rate <= 1.0) {
            return invalid(format!("policy.mastery_rate must be in (0, 1], got {}", p.mastery_rate));
        }
        if p.history_limit == 0 {
            return invalid("policy.history_limit must be at least 1".to_string());
        }
        if self.reasoning.max_steps == 0 {
            return invalid("reasoning.max_steps must be at least 1".to_string());
        }
        if self.sandbox.timeout_ms == 0 || self.search.timeout_ms == 0 {
            return invalid("tool timeouts must be non-zero".to_string());
        }
        if self.sandbox.max_output_bytes == 0 {
            return invalid("sandbox.max_output_bytes must be non-zero".to_string());
        }
        if self.generation_timeout_secs == 0 {
            return invalid("generation_timeout_secs must be non-zero".to_string());
        }
        Ok(())
    }
}
