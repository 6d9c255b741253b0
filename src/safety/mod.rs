//! Input screening for learner questions and tool calls
//!
//! Nothing reaches the sandbox or the search backend without passing
//! `SafetyValidator::validate` first.
//!
//! ```text
//!   question ──► screen_question ──► refused? ──► refusal message
//!                     │
//!                     ▼
//!   tool call ──► validate(class, input) ──► Rejected(reason)
//!                     │                         (nothing executed)
//!                     ▼
//!                ToolExecutor
//! ```

pub mod policy;
pub mod validator;

pub use policy::SafetyPolicy;
pub use validator::{
    InputClass, Rejection, RejectionRule, SafetyValidator, HARMFUL_REFUSAL, OFF_TOPIC_REFUSAL,
};
