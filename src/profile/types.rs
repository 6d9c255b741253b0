//! Learner profile data model
//!
//! A profile is the only long-lived state the tutor keeps about a learner.
//! It is read when a query arrives and rewritten once the interaction is
//! complete (see `policy::PolicyUpdater`).

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::agent::TerminationReason;

/// Default number of interaction summaries retained on a profile
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Coarse skill tier used to calibrate explanation depth
///
/// Ordered: `Beginner < Intermediate < Advanced`. Transitions only ever move
/// one step at a time through `promote()` / `demote()`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    /// Next level up, capped at `Advanced`
    pub fn promote(self) -> Self {
        match self {
            SkillLevel::Beginner => SkillLevel::Intermediate,
            SkillLevel::Intermediate | SkillLevel::Advanced => SkillLevel::Advanced,
        }
    }

    /// Next level down, floored at `Beginner`
    pub fn demote(self) -> Self {
        match self {
            SkillLevel::Advanced => SkillLevel::Intermediate,
            SkillLevel::Intermediate | SkillLevel::Beginner => SkillLevel::Beginner,
        }
    }

    /// Ordinal position (0 = beginner)
    pub fn ordinal(self) -> u8 {
        match self {
            SkillLevel::Beginner => 0,
            SkillLevel::Intermediate => 1,
            SkillLevel::Advanced => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condensed record of one completed interaction
///
/// Carries no wall-clock data: replaying the same outcomes against
/// a fresh profile must reproduce it byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSummary {
    /// 1-based interaction number on this profile
    pub sequence: u64,
    /// Question text, truncated for storage
    pub question: String,
    /// Answer the learner was given, truncated for storage
    #[serde(default)]
    pub answer: Option<String>,
    /// Topic the question was classified under
    pub topic: String,
    pub termination_reason: TerminationReason,
    /// Outcome signal the policy was fed, in [0,1]
    pub reward: f64,
    /// Think cycles used
    pub steps: usize,
    /// Tool invocations attempted
    pub tool_calls: usize,
    pub skill_before: SkillLevel,
    pub skill_after: SkillLevel,
}

/// Long-term state for one learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub id: String,
    #[serde(default)]
    pub skill_level: SkillLevel,
    /// Topic → mastery score in [0,1]
    #[serde(default)]
    pub mastery: BTreeMap<String, f64>,
    /// Smoothed recent reward in [0,1]
    #[serde(default)]
    pub reward_ema: f64,
    #[serde(default)]
    pub streak_high: u32,
    #[serde(default)]
    pub streak_low: u32,
    /// Probability-like knob for offering stretch material; never increases
    pub exploration_rate: f64,
    /// Completed interactions over the profile's lifetime
    #[serde(default)]
    pub interactions: u64,
    /// Most recent interactions, oldest first
    #[serde(default)]
    pub history: VecDeque<InteractionSummary>,
    pub history_limit: usize,
}

impl LearnerProfile {
    /// Fresh profile: beginner, zero mastery, zero reward
    pub fn new(id: impl Into<String>, initial_exploration: f64, history_limit: usize) -> Self {
        Self {
            id: id.into(),
            skill_level: SkillLevel::Beginner,
            mastery: BTreeMap::new(),
            reward_ema: 0.0,
            streak_high: 0,
            streak_low: 0,
            exploration_rate: initial_exploration.clamp(0.0, 1.0),
            interactions: 0,
            history: VecDeque::new(),
            history_limit,
        }
    }

    /// Mastery for a topic (0.0 when never seen)
    pub fn mastery_of(&self, topic: &str) -> f64 {
        self.mastery.get(topic).copied().unwrap_or(0.0)
    }

    /// Append a summary, evicting the oldest beyond `history_limit`
    pub fn push_history(&mut self, summary: InteractionSummary) {
        self.history.push_back(summary);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// The last `turns` question/answer pairs, oldest first
    ///
    /// Empty when there is no history or `turns` is 0.
    pub fn recent_conversation(&self, turns: usize) -> String {
        let skip = self.history.len().saturating_sub(turns);
        self.history
            .iter()
            .skip(skip)
            .map(|entry| {
                format!(
                    "Learner: {}\nTutor: {}",
                    entry.question,
                    entry.answer.as_deref().unwrap_or("(no answer)")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Human-readable digest for the generation prompt
    pub fn summary(&self, topic: &str) -> String {
        let mut recent: Vec<&str> = Vec::new();
        for entry in self.history.iter().rev() {
            if !recent.contains(&entry.topic.as_str()) {
                recent.push(&entry.topic);
            }
            if recent.len() == 3 {
                break;
            }
        }
        let recent = if recent.is_empty() {
            "none yet".to_string()
        } else {
            recent.join(", ")
        };

        format!(
            "Skill level: {}\nPast interactions: {}\nRecent topics: {}\nMastery of '{}': {:.2}",
            self.skill_level,
            self.interactions,
            recent,
            topic,
            self.mastery_of(topic)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(sequence: u64, topic: &str) -> InteractionSummary {
        InteractionSummary {
            sequence,
            question: format!("q{}", sequence),
            answer: Some(format!("a{}", sequence)),
            topic: topic.to_string(),
            termination_reason: TerminationReason::Answered,
            reward: 0.5,
            steps: 1,
            tool_calls: 0,
            skill_before: SkillLevel::Beginner,
            skill_after: SkillLevel::Beginner,
        }
    }

    #[test]
    fn test_skill_transitions_are_adjacent() {
        assert_eq!(SkillLevel::Beginner.promote(), SkillLevel::Intermediate);
        assert_eq!(SkillLevel::Intermediate.promote(), SkillLevel::Advanced);
        assert_eq!(SkillLevel::Advanced.promote(), SkillLevel::Advanced);
        assert_eq!(SkillLevel::Advanced.demote(), SkillLevel::Intermediate);
        assert_eq!(SkillLevel::Beginner.demote(), SkillLevel::Beginner);
    }

    #[test]
    fn test_new_profile_defaults() {
        let profile = LearnerProfile::new("ada", 0.3, 5);
        assert_eq!(profile.skill_level, SkillLevel::Beginner);
        assert!(profile.mastery.is_empty());
        assert_eq!(profile.reward_ema, 0.0);
        assert_eq!(profile.mastery_of("loops"), 0.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut profile = LearnerProfile::new("ada", 0.3, 3);
        for i in 1..=5 {
            profile.push_history(summary(i, "loops"));
        }
        assert_eq!(profile.history.len(), 3);
        assert_eq!(profile.history.front().map(|s| s.sequence), Some(3));
        assert_eq!(profile.history.back().map(|s| s.sequence), Some(5));
    }

    #[test]
    fn test_summary_lists_recent_topics_once() {
        let mut profile = LearnerProfile::new("ada", 0.3, 10);
        profile.push_history(summary(1, "loops"));
        profile.push_history(summary(2, "strings"));
        profile.push_history(summary(3, "loops"));
        let text = profile.summary("loops");
        assert!(text.contains("Recent topics: loops, strings"));
    }

    #[test]
    fn test_recent_conversation_keeps_last_turns() {
        let mut profile = LearnerProfile::new("ada", 0.3, 10);
        assert_eq!(profile.recent_conversation(3), "");

        for i in 1..=4 {
            profile.push_history(summary(i, "loops"));
        }
        assert_eq!(
            profile.recent_conversation(2),
            "Learner: q3\nTutor: a3\nLearner: q4\nTutor: a4"
        );
        assert_eq!(profile.recent_conversation(0), "");
        assert_eq!(profile.recent_conversation(10).lines().count(), 8);
    }

    #[test]
    fn test_summary_without_answer_still_loads() {
        let json = r#"{"sequence":1,"question":"q","topic":"loops","termination_reason":"answered",
            "reward":0.5,"steps":1,"tool_calls":0,"skill_before":"beginner","skill_after":"beginner"}"#;
        let summary: InteractionSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.answer, None);
    }

    #[test]
    fn test_skill_level_serializes_snake_case() {
        let json = serde_json::to_string(&SkillLevel::Intermediate).unwrap();
        assert_eq!(json, "\"intermediate\"");
    }
}
