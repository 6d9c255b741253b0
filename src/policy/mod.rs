//! Skill adaptation from interaction outcomes
//!
//! After every completed interaction the controller derives an outcome
//! signal (learner feedback when given, otherwise a trajectory heuristic)
//! and hands it to `PolicyUpdater::update`, which returns the next profile.
//! Nothing in this module performs I/O.

pub mod config;
pub mod reward;
pub mod topic;
pub mod updater;

pub use config::{PolicyConfig, RewardHeuristic};
pub use reward::{clamp_signal, outcome_signal, LearnerFeedback};
pub use topic::{classify_topic, Topic};
pub use updater::{PolicyState, PolicyUpdater};
