//! Outcome signal derivation
//!
//! ```text
//!   LearnerFeedback ──► correct → 1.0 / incorrect → 0.0
//!                       rating r (1..=5) → (r − 1) / 4
//!                       both → mean
//!         │ none given
//!         ▼
//!   RewardHeuristic[termination_reason] (+ bonus if a tool succeeded)
//! ```

use serde::{Deserialize, Serialize};

use super::config::RewardHeuristic;
use crate::agent::{TerminationReason, Trajectory};

/// What the learner said about an answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerFeedback {
    /// Whether the answer solved the learner's problem
    pub correct: Option<bool>,
    /// Satisfaction rating, 1 (poor) to 5 (great); clamped into range
    pub rating: Option<u8>,
}

impl LearnerFeedback {
    /// Signal in [0, 1], or `None` if the learner said nothing
    pub fn signal(&self) -> Option<f64> {
        let correctness = self.correct.map(|c| if c { 1.0 } else { 0.0 });
        let rating = self
            .rating
            .map(|r| (f64::from(r.clamp(1, 5)) - 1.0) / 4.0);
        match (correctness, rating) {
            (Some(c), Some(r)) => Some((c + r) / 2.0),
            (Some(c), None) => Some(c),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        }
    }
}

/// Map an interaction outcome to a scalar in [0, 1]
pub fn outcome_signal(
    trajectory: &Trajectory,
    feedback: Option<&LearnerFeedback>,
    heuristic: &RewardHeuristic,
) -> f64 {
    if let Some(signal) = feedback.and_then(LearnerFeedback::signal) {
        return clamp_signal(signal);
    }

    let base = match trajectory.termination_reason() {
        TerminationReason::Answered => heuristic.answered,
        TerminationReason::StepBudgetExhausted => heuristic.step_budget_exhausted,
        TerminationReason::SafetyRejected => heuristic.safety_rejected,
        TerminationReason::ToolFatalError => heuristic.tool_fatal_error,
        TerminationReason::BackendError => 0.0,
    };
    let bonus = if trajectory.has_successful_observation() {
        heuristic.tool_success_bonus
    } else {
        0.0
    };
    clamp_signal(base + bonus)
}

/// Clamp into [0, 1]; NaN becomes 0
pub fn clamp_signal(signal: f64) -> f64 {
    if signal.is_nan() {
        0.0
    } else {
        signal.clamp(0.0, 1.0)
    }
}
