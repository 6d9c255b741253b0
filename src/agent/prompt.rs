//! System prompt construction
//!
//! This is the only place the learner's skill level is read during a
//! reasoning run.

use crate::policy::{PolicyState, Topic};
use crate::profile::{LearnerProfile, SkillLevel};
use crate::tools::ToolKind;

/// Exploration rates at or above this ask for an optional stretch exercise
const STRETCH_THRESHOLD: f64 = 0.1;

/// Sent after a reasoning-only turn to ask for an action or an answer
pub const CONTINUE_PROMPT: &str =
    "Continue. Either call a tool or give your final answer, using the JSON format.";

const RESPONSE_FORMAT: &str = r#"Always reply with a single JSON object and nothing else:

{
  "thought": "short summary of your reasoning",
  "action": "run_python" | "web_search" | "none",
  "action_input": "code or query for the tool, empty when action is none",
  "answer": "your message to the learner, empty when calling a tool"
}

Rules:
- Call at most one tool per reply. You will see its result and can continue.
- Code runs in an isolated sandbox without file, network or process access.
- When you have enough information, set action to "none" and give the answer.
- Stay on Python programming topics and be kind and encouraging."#;

fn skill_guidance(level: SkillLevel) -> &'static str {
    match level {
        SkillLevel::Beginner => {
            "The learner is a beginner. Use plain language, short examples, and explain every step. Avoid jargon."
        }
        SkillLevel::Intermediate => {
            "The learner is intermediate. Assume basic syntax is known; focus on idioms, common pitfalls, and why things work."
        }
        SkillLevel::Advanced => {
            "The learner is advanced. Be concise; discuss trade-offs, performance, and edge cases."
        }
    }
}

fn exploration_hint(state: &PolicyState) -> String {
    if state.exploration_rate >= STRETCH_THRESHOLD {
        format!(
            "Exploration rate {:.2}: when it fits, end with one optional stretch exercise slightly above the learner's level.",
            state.exploration_rate
        )
    } else {
        format!(
            "Exploration rate {:.2}: keep exercises at the learner's current level.",
            state.exploration_rate
        )
    }
}

/// Build the system prompt for one interaction
///
/// # Arguments
/// * `state` - Policy view of the learner (skill level, exploration rate)
/// * `profile` - Full profile, for the learner summary
/// * `topic` - Topic the question was classified under
/// * `conversation_turns` - Past exchanges to include as recent conversation
pub fn build_system_prompt(
    state: &PolicyState,
    profile: &LearnerProfile,
    topic: Topic,
    conversation_turns: usize,
) -> String {
    let tools = ToolKind::ALL
        .iter()
        .map(|t| format!("- {}", t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    let conversation = profile.recent_conversation(conversation_turns);
    let conversation = if conversation.is_empty() {
        String::new()
    } else {
        format!("Recent conversation (oldest first):\n{}\n\n", conversation)
    };

    format!(
        "You are an interactive learning companion that tutors students in Python.\n\n\
         {guidance}\n{hint}\n\n\
         Learner context:\n{summary}\n\n\
         {conversation}\
         Tools:\n{tools}\n\n\
         {format}",
        guidance = skill_guidance(state.skill_level),
        hint = exploration_hint(state),
        summary = profile.summary(topic.as_str()),
        conversation = conversation,
        tools = tools,
        format = RESPONSE_FORMAT,
    )
}
