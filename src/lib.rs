//! Tutorloop - an adaptive programming tutor built on a ReAct loop
//!
//! A learner asks a question; the agent reasons with a local LLM, may run
//! Python in a sandbox or search the web, answers, and then adapts the
//! learner's profile from the outcome.
//!
//! # Modules
//!
//! - `agent` - Controller, reasoning loop, decisions, prompts and trajectories
//! - `llm` - Generation backend trait and the Ollama chat client
//! - `tools` - Tool executor, process sandbox, web search, rate limiting
//! - `safety` - Input screening for questions and tool inputs
//! - `profile` - Learner profiles and their store
//! - `policy` - Reward signals and the hysteresis skill-level updater
//! - `config` - Layered runtime configuration
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - Logging and optional OTLP trace export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tutorloop::{AgentController, ProfileStore};
//!
//! let store = Arc::new(ProfileStore::in_memory(config.policy.profile_defaults()));
//! let controller = AgentController::new(store, reasoning, updater, validator);
//!
//! let response = controller.handle_query("ada", "How do Python list comprehensions work?").await?;
//! println!("{}", response.answer);
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod policy;
pub mod profile;
pub mod safety;
pub mod tools;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentController, AgentError, LoopConfig, QueryResponse, ReasoningLoop, TerminationReason};
pub use config::{ConfigError, TutorConfig};
pub use llm::{GenerationBackend, OllamaClient};
pub use policy::{LearnerFeedback, PolicyConfig, PolicyUpdater};
pub use profile::{LearnerProfile, ProfileStore, SkillLevel};
pub use safety::SafetyValidator;
pub use tools::ToolExecutor;
