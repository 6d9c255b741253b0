//! Tunable constants of the adaptation policy

use serde::{Deserialize, Serialize};

use crate::profile::{ProfileDefaults, DEFAULT_HISTORY_LIMIT};

/// Hysteresis controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// EMA smoothing factor α, in (0, 1)
    pub alpha: f64,
    /// `reward_ema` at or above this extends the high streak
    pub high_threshold: f64,
    /// `reward_ema` at or below this extends the low streak
    pub low_threshold: f64,
    /// Streak length N that triggers a promotion or demotion
    pub streak_length: u32,
    /// Exploration rate given to new learners
    pub initial_exploration: f64,
    /// Multiplicative exploration decay per interaction
    pub exploration_decay: f64,
    /// Exploration never decays below this
    pub exploration_floor: f64,
    /// EMA factor for per-topic mastery
    pub mastery_rate: f64,
    /// Interaction summaries kept per learner
    pub history_limit: usize,
    /// Outcome signal used when the learner gives no feedback
    pub heuristic: RewardHeuristic,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            high_threshold: 0.8,
            low_threshold: 0.3,
            streak_length: 3,
            initial_exploration: 0.3,
            exploration_decay: 0.95,
            exploration_floor: 0.05,
            mastery_rate: 0.3,
            history_limit: DEFAULT_HISTORY_LIMIT,
            heuristic: RewardHeuristic::default(),
        }
    }
}

impl PolicyConfig {
    /// Defaults for profiles created on first contact
    pub fn profile_defaults(&self) -> ProfileDefaults {
        ProfileDefaults {
            initial_exploration: self.initial_exploration,
            history_limit: self.history_limit,
        }
    }
}

/// Outcome signal per termination reason, used without learner feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardHeuristic {
    pub answered: f64,
    pub step_budget_exhausted: f64,
    pub safety_rejected: f64,
    pub tool_fatal_error: f64,
    /// Added when at least one tool call succeeded
    pub tool_success_bonus: f64,
}

impl Default for RewardHeuristic {
    fn default() -> Self {
        Self {
            answered: 0.7,
            step_budget_exhausted: 0.3,
            safety_rejected: 0.1,
            tool_fatal_error: 0.2,
            tool_success_bonus: 0.1,
        }
    }
}
