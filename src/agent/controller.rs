//! Agent Controller - one learner question end to end
//!
//! ```text
//!   handle_query(learner_id, question)
//!        │
//!        ├─ screen_question ──► refused ──► refusal (no profile access)
//!        │
//!        ├─ ProfileStore::lock(id)      per-learner lease, held to the end
//!        ├─ ProfileStore::load(id)      get-or-create
//!        ├─ ReasoningLoop::run          Think / Act / Observe
//!        │     └─ backend_error ──► AgentError::BackendUnavailable (no save)
//!        │
//!        │   ┄┄ answer shown; learner feedback may arrive here ┄┄
//!        │
//!        ├─ outcome_signal + PolicyUpdater::update
//!        └─ ProfileStore::save          failure ──► ProfileStoreUnavailable
//! ```
//!
//! The two halves are exposed separately (`begin` / `Interaction::complete`)
//! so a caller can show the answer, collect feedback, and only then commit
//! the profile update, all under the same lease.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::reasoning::ReasoningLoop;
use super::trajectory::{TerminationReason, Trajectory};
use crate::metrics::{INTERACTIONS, LOOP_STEPS, SKILL_TRANSITIONS};
use crate::policy::{outcome_signal, LearnerFeedback, PolicyState, PolicyUpdater};
use crate::profile::{validate_id, LearnerProfile, ProfileLease, ProfileStore, SkillLevel, StoreError};
use crate::safety::SafetyValidator;

/// What the caller gets back for one question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Text to show the learner
    pub answer: String,
    pub termination_reason: TerminationReason,
    /// Best-effort answer (step budget or tool failure)
    pub incomplete: bool,
    /// Time-sortable id correlating logs and spans for this interaction
    pub trace_id: String,
    /// Think cycles used
    pub steps: usize,
    pub tool_calls: usize,
    /// Skill level after the update; `None` when the question was refused
    pub skill_level: Option<SkillLevel>,
}

/// Error type for agent operations
///
/// Tool failures never show up here; they are observations inside the loop.
#[derive(Debug)]
pub enum AgentError {
    /// The learner id is not usable as a profile key
    InvalidLearnerId { trace_id: String, learner_id: String },
    /// The generation backend failed; nothing was persisted
    BackendUnavailable { trace_id: String, detail: String },
    /// Loading or saving the profile failed; the stored profile is unchanged
    ProfileStoreUnavailable { trace_id: String, source: StoreError },
}

impl AgentError {
    pub fn trace_id(&self) -> &str {
        match self {
            AgentError::InvalidLearnerId { trace_id, .. }
            | AgentError::BackendUnavailable { trace_id, .. }
            | AgentError::ProfileStoreUnavailable { trace_id, .. } => trace_id,
        }
    }
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::InvalidLearnerId { learner_id, .. } => {
                write!(f, "Invalid learner id '{}'", learner_id)
            }
            AgentError::BackendUnavailable { detail, .. } => {
                write!(f, "Generation backend unavailable: {}", detail)
            }
            AgentError::ProfileStoreUnavailable { source, .. } => {
                write!(f, "Profile store unavailable: {}", source)
            }
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::ProfileStoreUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Agent Controller wiring screening, reasoning, adaptation and persistence
pub struct AgentController {
    store: Arc<ProfileStore>,
    reasoning: ReasoningLoop,
    updater: PolicyUpdater,
    validator: SafetyValidator,
}

/// A question in flight
pub enum Interaction<'a> {
    /// Refused at screening; nothing further to do
    Refused(QueryResponse),
    /// Answered (or best-effort); profile update still pending
    Pending(PendingInteraction<'a>),
}

impl Interaction<'_> {
    /// The text to show the learner now
    pub fn answer(&self) -> &str {
        match self {
            Interaction::Refused(response) => &response.answer,
            Interaction::Pending(pending) => pending.answer(),
        }
    }

    pub fn termination_reason(&self) -> TerminationReason {
        match self {
            Interaction::Refused(response) => response.termination_reason,
            Interaction::Pending(pending) => pending.trajectory.termination_reason(),
        }
    }

    /// Apply the outcome to the profile and persist it
    pub async fn complete(
        self,
        feedback: Option<LearnerFeedback>,
    ) -> Result<QueryResponse, AgentError> {
        match self {
            Interaction::Refused(response) => Ok(response),
            Interaction::Pending(pending) => pending.complete(feedback).await,
        }
    }
}

/// Holds the learner's lease from load until the profile is saved
pub struct PendingInteraction<'a> {
    controller: &'a AgentController,
    _lease: ProfileLease,
    profile: LearnerProfile,
    trajectory: Trajectory,
    trace_id: String,
    span: Span,
}

impl PendingInteraction<'_> {
    pub fn answer(&self) -> &str {
        self.trajectory.final_answer().unwrap_or_default()
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    async fn complete(self, feedback: Option<LearnerFeedback>) -> Result<QueryResponse, AgentError> {
        let span = self.span.clone();
        async move {
            let controller = self.controller;
            let signal = outcome_signal(
                &self.trajectory,
                feedback.as_ref(),
                &controller.updater.config().heuristic,
            );
            let updated = controller.updater.update(&self.profile, &self.trajectory, signal);

            controller.store.save(&updated).await.map_err(|source| {
                warn!(trace_id = %self.trace_id, error = %source, "Profile not saved; keeping previous state");
                AgentError::ProfileStoreUnavailable {
                    trace_id: self.trace_id.clone(),
                    source,
                }
            })?;

            let before = self.profile.skill_level;
            let after = updated.skill_level;
            if after != before {
                let direction = if after > before { "promote" } else { "demote" };
                SKILL_TRANSITIONS.with_label_values(&[direction]).inc();
                info!(from = %before, to = %after, direction, "Skill level changed");
            }

            info!(
                reward = signal,
                reward_ema = updated.reward_ema,
                skill_level = %after,
                feedback = feedback.is_some(),
                "Profile updated"
            );

            Ok(QueryResponse {
                answer: self.trajectory.final_answer().unwrap_or_default().to_string(),
                termination_reason: self.trajectory.termination_reason(),
                incomplete: self.trajectory.is_incomplete(),
                trace_id: self.trace_id.clone(),
                steps: self.trajectory.think_count(),
                tool_calls: self.trajectory.tool_calls(),
                skill_level: Some(after),
            })
        }
        .instrument(span)
        .await
    }
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `store` - Shared profile store (the only shared mutable state)
    /// * `reasoning` - Reasoning loop with its backend and tool executor
    /// * `updater` - Adaptation policy
    /// * `validator` - Screens the learner's question before anything runs
    pub fn new(
        store: Arc<ProfileStore>,
        reasoning: ReasoningLoop,
        updater: PolicyUpdater,
        validator: SafetyValidator,
    ) -> Self {
        Self {
            store,
            reasoning,
            updater,
            validator,
        }
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    /// Answer a question and update the learner's profile from a heuristic
    pub async fn handle_query(
        &self,
        learner_id: &str,
        question: &str,
    ) -> Result<QueryResponse, AgentError> {
        self.handle_query_with_feedback(learner_id, question, None).await
    }

    /// Answer a question with feedback already known (e.g. replayed sessions)
    pub async fn handle_query_with_feedback(
        &self,
        learner_id: &str,
        question: &str,
        feedback: Option<LearnerFeedback>,
    ) -> Result<QueryResponse, AgentError> {
        self.begin(learner_id, question).await?.complete(feedback).await
    }

    /// Screen, load and reason; the profile update waits for `complete`
    pub async fn begin(&self, learner_id: &str, question: &str) -> Result<Interaction<'_>, AgentError> {
        let trace_id = Uuid::now_v7().to_string();
        let span = info_span!(
            "interaction",
            trace_id = %trace_id,
            learner_id = %learner_id,
            otel.name = "interaction"
        );

        self.begin_inner(learner_id, question, trace_id, span.clone())
            .instrument(span)
            .await
    }

    async fn begin_inner(
        &self,
        learner_id: &str,
        question: &str,
        trace_id: String,
        span: Span,
    ) -> Result<Interaction<'_>, AgentError> {
        info!(question_len = question.len(), "Starting interaction");

        if let Err((rejection, refusal)) = self.validator.screen_question(question) {
            info!(rule = rejection.rule.as_str(), "Question refused");
            INTERACTIONS
                .with_label_values(&[TerminationReason::SafetyRejected.as_str()])
                .inc();
            return Ok(Interaction::Refused(QueryResponse {
                answer: refusal.to_string(),
                termination_reason: TerminationReason::SafetyRejected,
                incomplete: false,
                trace_id,
                steps: 0,
                tool_calls: 0,
                skill_level: None,
            }));
        }

        if validate_id(learner_id).is_err() {
            return Err(AgentError::InvalidLearnerId {
                trace_id,
                learner_id: learner_id.to_string(),
            });
        }

        let lease = self.store.lock(learner_id).await;
        let profile = self.store.load(learner_id).await.map_err(|source| {
            AgentError::ProfileStoreUnavailable {
                trace_id: trace_id.clone(),
                source,
            }
        })?;

        let state = PolicyState::from(&profile);
        let trajectory = self.reasoning.run(question, &state, &profile).await;
        let reason = trajectory.termination_reason();

        INTERACTIONS.with_label_values(&[reason.as_str()]).inc();
        LOOP_STEPS.observe(trajectory.think_count() as f64);
        info!(
            termination_reason = %reason,
            steps = trajectory.think_count(),
            tool_calls = trajectory.tool_calls(),
            "Reasoning finished"
        );

        if reason == TerminationReason::BackendError {
            return Err(AgentError::BackendUnavailable {
                trace_id,
                detail: trajectory
                    .failure_detail()
                    .unwrap_or("generation failed")
                    .to_string(),
            });
        }

        Ok(Interaction::Pending(PendingInteraction {
            controller: self,
            _lease: lease,
            profile,
            trajectory,
            trace_id,
            span,
        }))
    }
}
