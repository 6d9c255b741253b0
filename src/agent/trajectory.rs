//! Record of one reasoning-loop run

use serde::{Deserialize, Serialize};

use crate::tools::ToolStatus;

/// Why the loop stopped; exactly one per trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The model produced a final answer
    Answered,
    /// The step budget ran out; the answer is best-effort
    StepBudgetExhausted,
    /// The question or repeated tool inputs were refused
    SafetyRejected,
    /// A tool's infrastructure failed (e.g. the sandbox could not start)
    ToolFatalError,
    /// The generation backend could not be reached
    BackendError,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::Answered => "answered",
            TerminationReason::StepBudgetExhausted => "step_budget_exhausted",
            TerminationReason::SafetyRejected => "safety_rejected",
            TerminationReason::ToolFatalError => "tool_fatal_error",
            TerminationReason::BackendError => "backend_error",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Think { text: String },
    Act { tool: String, input: String },
    Observe { output: String, status: ToolStatus },
}

/// A finished run: steps in order, the answer, and the termination reason
///
/// Built once the loop stops, so the termination reason is always set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    question: String,
    steps: Vec<Step>,
    final_answer: Option<String>,
    termination_reason: TerminationReason,
    incomplete: bool,
    failure_detail: Option<String>,
}

impl Trajectory {
    pub fn finished(
        question: impl Into<String>,
        steps: Vec<Step>,
        termination_reason: TerminationReason,
        final_answer: Option<String>,
    ) -> Self {
        Self {
            question: question.into(),
            steps,
            final_answer,
            termination_reason,
            incomplete: false,
            failure_detail: None,
        }
    }

    /// Flag the answer as best-effort
    pub fn mark_incomplete(mut self) -> Self {
        self.incomplete = true;
        self
    }

    /// Attach the error that ended the run
    pub fn with_failure(mut self, detail: impl Into<String>) -> Self {
        self.failure_detail = Some(detail.into());
        self
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn termination_reason(&self) -> TerminationReason {
        self.termination_reason
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn failure_detail(&self) -> Option<&str> {
        self.failure_detail.as_deref()
    }

    /// Number of generation (think) cycles, counted as Think steps
    pub fn think_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Think { .. }))
            .count()
    }

    pub fn tool_calls(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Act { .. }))
            .count()
    }

    /// Distinct tool names in first-use order
    pub fn tools_used(&self) -> Vec<&str> {
        tools_used_in(&self.steps)
    }

    pub fn has_successful_observation(&self) -> bool {
        self.steps.iter().any(|s| {
            matches!(
                s,
                Step::Observe {
                    status: ToolStatus::Success,
                    ..
                }
            )
        })
    }

    pub fn rejection_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| {
                matches!(
                    s,
                    Step::Observe {
                        status: ToolStatus::Rejected,
                        ..
                    }
                )
            })
            .count()
    }
}

pub(crate) fn tools_used_in(steps: &[Step]) -> Vec<&str> {
    let mut used: Vec<&str> = Vec::new();
    for step in steps {
        if let Step::Act { tool, .. } = step {
            if !used.contains(&tool.as_str()) {
                used.push(tool);
            }
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trajectory {
        Trajectory::finished(
            "q",
            vec![
                Step::Think {
                    text: "try it".to_string(),
                },
                Step::Act {
                    tool: "run_python".to_string(),
                    input: "import os".to_string(),
                },
                Step::Observe {
                    output: "rejected".to_string(),
                    status: ToolStatus::Rejected,
                },
                Step::Think {
                    text: "again".to_string(),
                },
                Step::Act {
                    tool: "run_python".to_string(),
                    input: "print(1)".to_string(),
                },
                Step::Observe {
                    output: "1".to_string(),
                    status: ToolStatus::Success,
                },
            ],
            TerminationReason::StepBudgetExhausted,
            Some("again".to_string()),
        )
        .mark_incomplete()
    }

    #[test]
    fn test_counts() {
        let t = sample();
        assert_eq!(t.think_count(), 2);
        assert_eq!(t.tool_calls(), 2);
        assert_eq!(t.rejection_count(), 1);
        assert_eq!(t.tools_used(), vec!["run_python"]);
        assert!(t.has_successful_observation());
        assert!(t.is_incomplete());
    }

    #[test]
    fn test_serialization_tags_steps() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["termination_reason"], "step_budget_exhausted");
        assert_eq!(json["steps"][0]["kind"], "think");
        assert_eq!(json["steps"][2]["status"], "rejected");
    }
}
