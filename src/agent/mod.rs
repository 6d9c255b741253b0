//! Tutor agent: the ReAct loop and the per-question controller
//!
//! # Architecture
//!
//! ```text
//! Learner question → AgentController
//!                         ↓
//!                  SafetyValidator::screen_question
//!                         ↓
//!                  ProfileStore lease + load
//!                         ↓
//!                  ReasoningLoop ──► GenerationBackend (Think)
//!                         │     ──► ToolExecutor      (Act / Observe)
//!                         ↓
//!                  Trajectory → outcome signal → PolicyUpdater
//!                         ↓
//!                  ProfileStore::save → QueryResponse
//! ```

pub mod controller;
pub mod decision;
pub mod prompt;
pub mod reasoning;
pub mod trajectory;

pub use controller::{AgentController, AgentError, Interaction, PendingInteraction, QueryResponse};
pub use decision::{parse_decision, Decision};
pub use prompt::build_system_prompt;
pub use reasoning::{LoopConfig, ReasoningLoop, INCOMPLETE_NOTE, REPEATED_REJECTION_ANSWER};
pub use trajectory::{Step, TerminationReason, Trajectory};
