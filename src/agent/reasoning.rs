//! Bounded Think → Act → Observe loop
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            ▼                                          │
//!   ┌──────────────┐  answer   ┌─────────┐             │
//!   │    Think     │──────────►│ Respond │──► answered  │
//!   │ (generate)   │           └─────────┘             │
//!   └──────────────┘                                    │
//!       │ tool call                                     │
//!       ▼                                               │
//!   ┌──────────────┐        ┌──────────────┐            │
//!   │     Act      │───────►│   Observe    │────────────┘
//!   │ ToolExecutor │        │ (ToolResult) │
//!   └──────────────┘        └──────────────┘
//!          │ fatal                 │ rejections ≥ max_rejections
//!          ▼                       ▼
//!   tool_fatal_error        safety_rejected
//!
//!   backend failure at any Think ──► backend_error
//!   max_steps Think cycles without an answer ──► step_budget_exhausted
//! ```
//!
//! The loop makes at most `max_steps` generation calls, so it always
//! terminates regardless of what the backend returns.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use super::decision::{parse_decision, Decision};
use super::prompt::{build_system_prompt, CONTINUE_PROMPT};
use super::trajectory::{tools_used_in, Step, TerminationReason, Trajectory};
use crate::llm::{ChatMessage, GenerationBackend};
use crate::metrics::GENERATION_DURATION;
use crate::policy::{classify_topic, PolicyState};
use crate::profile::LearnerProfile;
use crate::tools::{ToolExecutor, ToolStatus};

/// Appended to best-effort answers
pub const INCOMPLETE_NOTE: &str =
    "(This answer is incomplete: I ran out of reasoning steps before finishing.)";

/// Answer when tool inputs kept being refused
pub const REPEATED_REJECTION_ANSWER: &str = "I wasn't able to run the code I wanted to use safely, \
so I stopped here. Try asking about the concept directly and I'll explain it without running code.";

/// Answer when a tool's infrastructure failed and there is no thought to fall back on
const FALLBACK_ANSWER: &str = "I wasn't able to finish working through this question.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum Think cycles (generation calls) per interaction
    pub max_steps: usize,
    /// Rejected tool calls that end the interaction; 0 disables the cutoff
    pub max_rejections: usize,
    /// Suffix answers with a note naming the tools that were used
    pub transparency_note: bool,
    /// Past exchanges shown to the model as recent conversation; 0 disables
    pub conversation_turns: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 4,
            max_rejections: 2,
            transparency_note: true,
            conversation_turns: 3,
        }
    }
}

pub struct ReasoningLoop {
    backend: Arc<dyn GenerationBackend>,
    executor: Arc<ToolExecutor>,
    config: LoopConfig,
}

impl ReasoningLoop {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        executor: Arc<ToolExecutor>,
        config: LoopConfig,
    ) -> Self {
        Self {
            backend,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run the loop for one question
    ///
    /// Never fails: every outcome, including an unreachable backend, is a
    /// `Trajectory` with its termination reason set.
    ///
    /// # Arguments
    /// * `question` - The learner's question, already screened
    /// * `state` - Policy view used for difficulty calibration
    /// * `profile` - Learner profile, for the learner summary in the prompt
    pub async fn run(&self, question: &str, state: &PolicyState, profile: &LearnerProfile) -> Trajectory {
        let topic = classify_topic(question);
        let mut messages = vec![
            ChatMessage::system(build_system_prompt(
                state,
                profile,
                topic,
                self.config.conversation_turns,
            )),
            ChatMessage::user(question),
        ];
        let mut steps: Vec<Step> = Vec::new();
        let mut rejections = 0usize;
        let model = self.backend.model_name().to_string();

        for step in 1..=self.config.max_steps {
            let think_span = info_span!("think", step, model = %model, otel.name = "think");
            let start = Instant::now();
            let generated = self.backend.generate(&messages).instrument(think_span).await;
            GENERATION_DURATION
                .with_label_values(&[model.as_str()])
                .observe(start.elapsed().as_secs_f64());

            let raw = match generated {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(step, error = %e, "Generation backend failed");
                    return Trajectory::finished(question, steps, TerminationReason::BackendError, None)
                        .with_failure(e.to_string());
                }
            };

            let decision = parse_decision(&raw);
            steps.push(Step::Think {
                text: decision.thought().unwrap_or_default().to_string(),
            });

            match decision {
                Decision::Respond { answer, .. } => {
                    info!(step, "Answer produced");
                    let answer = self.with_transparency_note(answer, &steps);
                    return Trajectory::finished(question, steps, TerminationReason::Answered, Some(answer));
                }
                Decision::Reflect { .. } => {
                    debug!(step, "Reasoning-only turn");
                    messages.push(ChatMessage::assistant(raw));
                    messages.push(ChatMessage::user(CONTINUE_PROMPT));
                }
                Decision::Act { tool, input, .. } => {
                    messages.push(ChatMessage::assistant(raw));
                    steps.push(Step::Act {
                        tool: tool.clone(),
                        input: input.clone(),
                    });

                    let tool_span = info_span!("tool_call", step, tool = %tool, otel.name = "tool_call");
                    let result = self.executor.execute(&tool, &input).instrument(tool_span).await;
                    let observation = result.render();
                    info!(step, tool = %tool, status = %result.status(), "Tool observed");

                    steps.push(Step::Observe {
                        output: observation.clone(),
                        status: result.status(),
                    });
                    messages.push(ChatMessage::tool(observation));

                    if result.is_fatal() {
                        warn!(step, tool = %tool, "Tool infrastructure failure ends the interaction");
                        let answer = self.with_transparency_note(best_effort_answer(&steps), &steps);
                        return Trajectory::finished(
                            question,
                            steps,
                            TerminationReason::ToolFatalError,
                            Some(answer),
                        )
                        .mark_incomplete()
                        .with_failure(result.error_detail().unwrap_or_default());
                    }

                    if result.status() == ToolStatus::Rejected {
                        rejections += 1;
                        if self.config.max_rejections > 0 && rejections >= self.config.max_rejections {
                            warn!(step, rejections, "Repeated tool rejections end the interaction");
                            return Trajectory::finished(
                                question,
                                steps,
                                TerminationReason::SafetyRejected,
                                Some(REPEATED_REJECTION_ANSWER.to_string()),
                            );
                        }
                    }
                }
            }
        }

        info!(max_steps = self.config.max_steps, "Step budget exhausted");
        let answer = self.with_transparency_note(best_effort_answer(&steps), &steps);
        Trajectory::finished(
            question,
            steps,
            TerminationReason::StepBudgetExhausted,
            Some(answer),
        )
        .mark_incomplete()
    }

    fn with_transparency_note(&self, answer: String, steps: &[Step]) -> String {
        if !self.config.transparency_note {
            return answer;
        }
        let used = tools_used_in(steps);
        if used.is_empty() {
            return answer;
        }
        format!(
            "{}\n\n(I used the {} tool{} to help answer this.)",
            answer,
            used.join(", "),
            if used.len() > 1 { "s" } else { "" }
        )
    }
}

/// Last non-empty thought, flagged as incomplete
fn best_effort_answer(steps: &[Step]) -> String {
    let last_thought = steps.iter().rev().find_map(|s| match s {
        Step::Think { text } if !text.trim().is_empty() => Some(text.as_str()),
        _ => None,
    });
    format!("{}\n\n{}", last_thought.unwrap_or(FALLBACK_ANSWER), INCOMPLETE_NOTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_effort_answer_uses_last_thought() {
        let steps = vec![
            Step::Think {
                text: "first".to_string(),
            },
            Step::Think {
                text: "second".to_string(),
            },
            Step::Think {
                text: "  ".to_string(),
            },
        ];
        let answer = best_effort_answer(&steps);
        assert!(answer.starts_with("second"));
        assert!(answer.ends_with(INCOMPLETE_NOTE));
    }

    #[test]
    fn test_best_effort_answer_without_thoughts() {
        let answer = best_effort_answer(&[]);
        assert!(answer.starts_with(FALLBACK_ANSWER));
    }
}
