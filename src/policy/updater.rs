//! Thresholded hysteresis controller over learner skill
//!
//! ```text
//!                   r = clamp(signal)
//!                          │
//!            ema ← α·r + (1 − α)·ema
//!                          │
//!        ┌─────────────────┼──────────────────┐
//!   ema ≥ high        low < ema < high     ema ≤ low
//!   streak_high += 1   reset both          streak_low += 1
//!   streak_low = 0                         streak_high = 0
//!        │                                      │
//!   streak_high ≥ N ─► promote           streak_low ≥ N ─► demote
//!   (one level, reset)                   (one level, reset)
//!
//!   exploration ← max(floor, exploration · decay)
//!   mastery[topic] ← EMA toward r
//! ```
//!
//! `update` is a pure function of its inputs: replaying the same outcome
//! sequence from the same starting profile reproduces the same profile.

use serde::{Deserialize, Serialize};

use super::config::PolicyConfig;
use super::reward::clamp_signal;
use super::topic::classify_topic;
use crate::agent::Trajectory;
use crate::profile::{InteractionSummary, LearnerProfile, SkillLevel};

/// Longest question prefix kept in the interaction history
const SUMMARY_QUESTION_CHARS: usize = 200;
const SUMMARY_ANSWER_CHARS: usize = 400;

/// The slice of a profile that drives action selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    pub skill_level: SkillLevel,
    pub reward_ema: f64,
    pub exploration_rate: f64,
}

impl From<&LearnerProfile> for PolicyState {
    fn from(profile: &LearnerProfile) -> Self {
        Self {
            skill_level: profile.skill_level,
            reward_ema: profile.reward_ema,
            exploration_rate: profile.exploration_rate,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyUpdater {
    config: PolicyConfig,
}

impl PolicyUpdater {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Apply one interaction outcome, returning the new profile
    ///
    /// # Arguments
    /// * `profile` - Profile as loaded before the interaction
    /// * `trajectory` - The finished reasoning trajectory
    /// * `outcome_signal` - Correctness estimate; clamped to [0, 1], NaN as 0
    pub fn update(
        &self,
        profile: &LearnerProfile,
        trajectory: &Trajectory,
        outcome_signal: f64,
    ) -> LearnerProfile {
        let cfg = &self.config;
        let mut next = profile.clone();
        let r = clamp_signal(outcome_signal);

        next.reward_ema = clamp_unit(cfg.alpha * r + (1.0 - cfg.alpha) * profile.reward_ema);

        if next.reward_ema >= cfg.high_threshold {
            next.streak_high += 1;
            next.streak_low = 0;
            if next.streak_high >= cfg.streak_length {
                next.skill_level = profile.skill_level.promote();
                next.streak_high = 0;
            }
        } else if next.reward_ema <= cfg.low_threshold {
            next.streak_low += 1;
            next.streak_high = 0;
            if next.streak_low >= cfg.streak_length {
                next.skill_level = profile.skill_level.demote();
                next.streak_low = 0;
            }
        } else {
            next.streak_high = 0;
            next.streak_low = 0;
        }

        // Never increases, even if the floor was raised after creation
        next.exploration_rate = (profile.exploration_rate * cfg.exploration_decay)
            .max(cfg.exploration_floor)
            .min(profile.exploration_rate);

        let topic = classify_topic(trajectory.question());
        let mastery = profile.mastery_of(topic.as_str());
        next.mastery.insert(
            topic.as_str().to_string(),
            clamp_unit(cfg.mastery_rate * r + (1.0 - cfg.mastery_rate) * mastery),
        );

        next.interactions = profile.interactions + 1;
        next.push_history(InteractionSummary {
            sequence: next.interactions,
            question: trajectory
                .question()
                .chars()
                .take(SUMMARY_QUESTION_CHARS)
                .collect(),
            answer: trajectory
                .final_answer()
                .map(|answer| answer.chars().take(SUMMARY_ANSWER_CHARS).collect()),
            topic: topic.as_str().to_string(),
            termination_reason: trajectory.termination_reason(),
            reward: r,
            steps: trajectory.think_count(),
            tool_calls: trajectory.tool_calls(),
            skill_before: profile.skill_level,
            skill_after: next.skill_level,
        });

        next
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TerminationReason;

    fn trajectory(question: &str) -> Trajectory {
        Trajectory::finished(
            question,
            vec![],
            TerminationReason::Answered,
            Some("answer".to_string()),
        )
    }

    fn fresh() -> LearnerProfile {
        LearnerProfile::new("alice", 0.3, 20)
    }

    #[test]
    fn test_promotion_after_streak() {
        // Five high-reward interactions from a fresh profile
        let updater = PolicyUpdater::default();
        let t = trajectory("How does a for loop work?");
        let mut profile = fresh();
        let mut levels = Vec::new();
        for _ in 0..5 {
            profile = updater.update(&profile, &t, 0.95);
            levels.push(profile.skill_level);
        }
        // ema: 0.475, 0.7125, 0.83125, 0.890625, 0.9203125
        // highs start at the 3rd interaction, so the 5th is the 3rd high
        assert_eq!(levels[0], SkillLevel::Beginner);
        assert_eq!(levels[3], SkillLevel::Beginner);
        assert_eq!(levels[4], SkillLevel::Intermediate);
        assert_eq!(profile.streak_high, 0);
    }

    #[test]
    fn test_promotion_from_high_ema() {
        let updater = PolicyUpdater::default();
        let t = trajectory("for loop");
        let mut profile = fresh();
        profile.reward_ema = 0.9;
        profile = updater.update(&profile, &t, 0.95);
        profile = updater.update(&profile, &t, 0.95);
        assert_eq!(profile.skill_level, SkillLevel::Beginner);
        profile = updater.update(&profile, &t, 0.95);
        assert_eq!(profile.skill_level, SkillLevel::Intermediate);
    }

    #[test]
    fn test_demotion_floors_at_beginner() {
        let updater = PolicyUpdater::default();
        let t = trajectory("while loop");
        let mut profile = fresh();
        for _ in 0..10 {
            profile = updater.update(&profile, &t, 0.0);
            assert_eq!(profile.skill_level, SkillLevel::Beginner);
        }

        profile.skill_level = SkillLevel::Advanced;
        profile.streak_low = 0;
        for _ in 0..3 {
            profile = updater.update(&profile, &t, 0.0);
        }
        assert_eq!(profile.skill_level, SkillLevel::Intermediate);
    }

    #[test]
    fn test_mixed_performance_resets_streaks() {
        let updater = PolicyUpdater::default();
        let t = trajectory("lists");
        let mut profile = fresh();
        profile.reward_ema = 0.5;
        profile.streak_high = 2;
        profile.streak_low = 1;
        let next = updater.update(&profile, &t, 0.5);
        assert_eq!(next.streak_high, 0);
        assert_eq!(next.streak_low, 0);
        assert_eq!(next.skill_level, SkillLevel::Beginner);
    }

    #[test]
    fn test_at_most_one_level_per_update() {
        let updater = PolicyUpdater::new(PolicyConfig {
            streak_length: 1,
            ..PolicyConfig::default()
        });
        let t = trajectory("functions");
        let mut profile = fresh();
        profile.reward_ema = 1.0;
        for _ in 0..5 {
            let next = updater.update(&profile, &t, 1.0);
            let delta = (next.skill_level.ordinal() as i32 - profile.skill_level.ordinal() as i32).abs();
            assert!(delta <= 1);
            profile = next;
        }
        assert_eq!(profile.skill_level, SkillLevel::Advanced);
    }

    #[test]
    fn test_values_stay_in_unit_range() {
        let updater = PolicyUpdater::default();
        let t = trajectory("recursion");
        let mut profile = fresh();
        for signal in [1.0, 7.5, -2.0, f64::NAN, f64::INFINITY, 0.3] {
            profile = updater.update(&profile, &t, signal);
            assert!((0.0..=1.0).contains(&profile.reward_ema));
            for value in profile.mastery.values() {
                assert!((0.0..=1.0).contains(value));
            }
        }
    }

    #[test]
    fn test_exploration_decays_to_floor() {
        let updater = PolicyUpdater::default();
        let t = trajectory("strings");
        let mut profile = fresh();
        let mut previous = profile.exploration_rate;
        for _ in 0..200 {
            profile = updater.update(&profile, &t, 0.5);
            assert!(profile.exploration_rate <= previous);
            previous = profile.exploration_rate;
        }
        assert!((profile.exploration_rate - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_mastery_and_history_recorded() {
        let updater = PolicyUpdater::default();
        let t = trajectory("How do I append to a list?");
        let next = updater.update(&fresh(), &t, 1.0);
        assert!((next.mastery_of("collections") - 0.3).abs() < 1e-9);
        assert_eq!(next.interactions, 1);
        assert_eq!(next.history.len(), 1);
        assert_eq!(next.history[0].topic, "collections");
        assert_eq!(next.history[0].sequence, 1);
    }

    #[test]
    fn test_update_is_deterministic() {
        let updater = PolicyUpdater::default();
        let signals = [0.9, 0.1, 0.95, 0.95, 0.4, 1.0, 0.0];
        let questions = ["for loop", "recursion", "dict keys", "class init"];

        let replay = || {
            let mut profile = fresh();
            for (i, signal) in signals.iter().enumerate() {
                let t = trajectory(questions[i % questions.len()]);
                profile = updater.update(&profile, &t, *signal);
            }
            profile
        };

        assert_eq!(replay(), replay());
    }
}
