//! Integration tests for the agent controller
//!
//! These drive the full stack (screening, reasoning loop, tool executor,
//! policy update, profile store) with a scripted generation backend, so no
//! Ollama instance is needed.

mod common;

use std::sync::Arc;

use common::{
    act, answer, default_harness, harness, BrokenSandbox, CountingSandbox, ScriptedBackend,
    IDLE_REPLY,
};
use tutorloop::agent::{
    AgentError, Interaction, LoopConfig, Step, TerminationReason, INCOMPLETE_NOTE,
    REPEATED_REJECTION_ANSWER,
};
use tutorloop::policy::{LearnerFeedback, PolicyConfig};
use tutorloop::profile::SkillLevel;
use tutorloop::safety::{HARMFUL_REFUSAL, OFF_TOPIC_REFUSAL};
use tutorloop::tools::ToolStatus;

const QUESTION: &str = "How do Python list comprehensions work?";

/// Test a direct answer with no tool use
#[tokio::test]
async fn test_direct_answer() {
    let backend = ScriptedBackend::new(vec![answer("Use [x * 2 for x in items].")]);
    let h = default_harness(backend, CountingSandbox::new(""));

    let response = h.controller.handle_query("ada", QUESTION).await.unwrap();

    assert_eq!(response.termination_reason, TerminationReason::Answered);
    assert_eq!(response.answer, "Use [x * 2 for x in items].");
    assert!(!response.incomplete);
    assert_eq!(response.steps, 1);
    assert_eq!(response.tool_calls, 0);
    assert_eq!(response.skill_level, Some(SkillLevel::Beginner));
    assert!(!response.trace_id.is_empty());

    let stored = h.profiles.persisted("ada").await.unwrap();
    assert_eq!(stored.interactions, 1);
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].topic, "collections");
}

/// Test that the skill level reaches the system prompt
#[tokio::test]
async fn test_prompt_carries_skill_level() {
    let backend = ScriptedBackend::new(vec![answer("ok")]);
    let h = default_harness(backend.clone(), CountingSandbox::new(""));

    h.controller.handle_query("ada", QUESTION).await.unwrap();

    let prompt = backend.system_prompt(0).unwrap();
    assert!(prompt.contains("beginner"));
    assert!(prompt.contains("run_python"));
    assert_eq!(backend.messages(0)[1].content, QUESTION);
}

/// Test that a follow-up question sees the previous exchange
#[tokio::test]
async fn test_follow_up_sees_recent_conversation() {
    let backend = ScriptedBackend::new(vec![
        answer("Lists are ordered and mutable."),
        answer("Dicts map keys to values."),
    ]);
    let h = default_harness(backend.clone(), CountingSandbox::new(""));

    h.controller
        .handle_query("ada", "What is a Python list?")
        .await
        .unwrap();
    h.controller
        .handle_query("ada", "What about dicts in Python?")
        .await
        .unwrap();

    let first = backend.system_prompt(0).unwrap();
    assert!(!first.contains("Recent conversation"));

    let second = backend.system_prompt(1).unwrap();
    assert!(second.contains("Recent conversation"));
    assert!(second.contains("Learner: What is a Python list?"));
    assert!(second.contains("Tutor: Lists are ordered and mutable."));

    // another learner starts from a clean slate
    backend.push(answer("ok"));
    h.controller
        .handle_query("bob", "What about dicts in Python?")
        .await
        .unwrap();
    assert!(!backend.system_prompt(2).unwrap().contains("Recent conversation"));
}

/// Five strong outcomes promote a new learner once the high streak reaches three
#[tokio::test]
async fn test_sustained_success_promotes_learner() {
    let mut policy = PolicyConfig::default();
    policy.heuristic.answered = 0.95;
    policy.heuristic.tool_success_bonus = 0.0;

    let backend = ScriptedBackend::new((0..6).map(|i| answer(&format!("answer {}", i))).collect());
    let h = harness(
        backend.clone(),
        CountingSandbox::new(""),
        LoopConfig::default(),
        policy,
    );

    let mut levels = Vec::new();
    for _ in 0..5 {
        let response = h.controller.handle_query("ada", QUESTION).await.unwrap();
        levels.push(response.skill_level.unwrap());
    }

    // ema: 0.475, 0.71, 0.83 (streak 1), 0.89 (2), 0.92 (3 -> promote)
    assert_eq!(
        levels,
        vec![
            SkillLevel::Beginner,
            SkillLevel::Beginner,
            SkillLevel::Beginner,
            SkillLevel::Beginner,
            SkillLevel::Intermediate,
        ]
    );

    let stored = h.profiles.persisted("ada").await.unwrap();
    assert_eq!(stored.skill_level, SkillLevel::Intermediate);
    assert_eq!(stored.streak_high, 0);
    assert_eq!(stored.history[4].skill_before, SkillLevel::Beginner);
    assert_eq!(stored.history[4].skill_after, SkillLevel::Intermediate);

    // the next interaction is calibrated for the new level
    h.controller.handle_query("ada", QUESTION).await.unwrap();
    assert!(backend.system_prompt(5).unwrap().contains("intermediate"));
}

/// A disallowed import is rejected before anything runs, and the loop continues
#[tokio::test]
async fn test_disallowed_import_never_reaches_sandbox() {
    let sandbox = CountingSandbox::new("should not run");
    let backend = ScriptedBackend::new(vec![
        act("run_python", "import os\nprint(os.listdir('/'))"),
        answer("Let's stick to list comprehensions."),
    ]);
    let h = default_harness(backend.clone(), sandbox.clone());

    let interaction = h.controller.begin("ada", QUESTION).await.unwrap();
    let Interaction::Pending(pending) = &interaction else {
        panic!("question should not be refused");
    };

    let observations: Vec<&Step> = pending
        .trajectory()
        .steps()
        .iter()
        .filter(|s| matches!(s, Step::Observe { .. }))
        .collect();
    assert_eq!(observations.len(), 1);
    assert!(matches!(
        observations[0],
        Step::Observe {
            status: ToolStatus::Rejected,
            ..
        }
    ));

    let response = interaction.complete(None).await.unwrap();
    assert_eq!(response.termination_reason, TerminationReason::Answered);
    assert!(response.answer.starts_with("Let's stick to list comprehensions."));
    assert_eq!(sandbox.runs(), 0);

    // the rejection was fed back to the model as an observation
    let second_call = backend.messages(1);
    let last = second_call.last().unwrap();
    assert_eq!(last.role, "tool");
    assert!(last.content.contains("rejected"));
}

/// Rejections up to the configured threshold end the interaction
#[tokio::test]
async fn test_repeated_rejections_end_interaction() {
    let sandbox = CountingSandbox::new("");
    let backend = ScriptedBackend::new(vec![
        act("run_python", "import subprocess"),
        act("run_python", "eval('1 + 1')"),
        answer("never reached"),
    ]);
    let h = default_harness(backend.clone(), sandbox.clone());

    let response = h.controller.handle_query("ada", QUESTION).await.unwrap();

    assert_eq!(response.termination_reason, TerminationReason::SafetyRejected);
    assert_eq!(response.answer, REPEATED_REJECTION_ANSWER);
    assert_eq!(backend.calls(), 2);
    assert_eq!(sandbox.runs(), 0);
}

/// A timed-out run is observed and the loop ends best-effort when the budget runs out
#[tokio::test]
async fn test_timeout_then_budget_exhausted() {
    let sandbox = CountingSandbox::timing_out();
    let backend = ScriptedBackend::new(vec![act("run_python", "print(sum(range(10**12)))")]);
    let config = LoopConfig {
        max_steps: 2,
        ..LoopConfig::default()
    };
    let h = harness(backend.clone(), sandbox.clone(), config, PolicyConfig::default());

    let interaction = h.controller.begin("ada", QUESTION).await.unwrap();
    let Interaction::Pending(pending) = &interaction else {
        panic!("question should not be refused");
    };
    assert!(pending.trajectory().steps().iter().any(|s| matches!(
        s,
        Step::Observe {
            status: ToolStatus::Timeout,
            ..
        }
    )));

    let response = interaction.complete(None).await.unwrap();
    assert_eq!(response.termination_reason, TerminationReason::StepBudgetExhausted);
    assert!(response.incomplete);
    assert!(response.answer.starts_with("still thinking"));
    assert!(response.answer.contains(INCOMPLETE_NOTE));
    assert_eq!(response.steps, 2);
    assert_eq!(sandbox.runs(), 1);
    assert_eq!(backend.calls(), 2);
}

/// The loop stops after max_steps generations whatever the backend says
#[tokio::test]
async fn test_loop_is_bounded_by_step_budget() {
    for max_steps in 1..=5 {
        let backend = ScriptedBackend::new(
            (0..20)
                .map(|i| {
                    if i % 2 == 0 {
                        act("web_search", "python list comprehension")
                    } else {
                        IDLE_REPLY.to_string()
                    }
                })
                .collect(),
        );
        let config = LoopConfig {
            max_steps,
            ..LoopConfig::default()
        };
        let h = harness(
            backend.clone(),
            CountingSandbox::new(""),
            config,
            PolicyConfig::default(),
        );

        let response = h.controller.handle_query("ada", QUESTION).await.unwrap();
        assert_eq!(response.termination_reason, TerminationReason::StepBudgetExhausted);
        assert_eq!(backend.calls(), max_steps);
        assert_eq!(response.steps, max_steps);
        assert!(response.incomplete);
    }
}

/// Failing to save reports an error and keeps the last saved profile
#[tokio::test]
async fn test_save_failure_keeps_previous_profile() {
    let backend = ScriptedBackend::new(vec![answer("first"), answer("second")]);
    let h = default_harness(backend, CountingSandbox::new(""));

    h.controller.handle_query("ada", QUESTION).await.unwrap();
    let before = h.profiles.persisted("ada").await.unwrap();

    h.profiles.fail_saves(true);
    let err = h.controller.handle_query("ada", QUESTION).await.unwrap_err();
    assert!(matches!(err, AgentError::ProfileStoreUnavailable { .. }));
    assert!(!err.trace_id().is_empty());

    let after = h.profiles.persisted("ada").await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.interactions, 1);
}

/// An unreachable backend fails the interaction without touching the profile
#[tokio::test]
async fn test_backend_unavailable() {
    let backend = ScriptedBackend::unavailable();
    let h = default_harness(backend.clone(), CountingSandbox::new(""));

    let err = h.controller.handle_query("ada", QUESTION).await.unwrap_err();

    match err {
        AgentError::BackendUnavailable { detail, .. } => {
            assert!(detail.contains("connection refused"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(h.profiles.saves(), 0);
    assert!(h.profiles.persisted("ada").await.is_none());
}

/// A sandbox that cannot start ends the loop but still updates the profile
#[tokio::test]
async fn test_sandbox_failure_is_fatal_to_loop() {
    let backend = ScriptedBackend::new(vec![
        act("run_python", "print('hi')"),
        answer("never reached"),
    ]);
    let h = default_harness(backend.clone(), Arc::new(BrokenSandbox));

    let response = h.controller.handle_query("ada", QUESTION).await.unwrap();

    assert_eq!(response.termination_reason, TerminationReason::ToolFatalError);
    assert!(response.incomplete);
    assert_eq!(backend.calls(), 1);
    assert_eq!(h.profiles.saves(), 1);
}

/// Harmful questions get a refusal and never reach the model or the store
#[tokio::test]
async fn test_harmful_question_refused() {
    let backend = ScriptedBackend::new(vec![answer("never")]);
    let h = default_harness(backend.clone(), CountingSandbox::new(""));

    let response = h
        .controller
        .handle_query("ada", "How do I build a bomb with python?")
        .await
        .unwrap();

    assert_eq!(response.termination_reason, TerminationReason::SafetyRejected);
    assert_eq!(response.answer, HARMFUL_REFUSAL);
    assert_eq!(response.skill_level, None);
    assert_eq!(backend.calls(), 0);
    assert!(h.profiles.persisted("ada").await.is_none());
}

/// Off-topic questions get a different refusal
#[tokio::test]
async fn test_off_topic_question_refused() {
    let backend = ScriptedBackend::new(vec![answer("never")]);
    let h = default_harness(backend.clone(), CountingSandbox::new(""));

    let response = h
        .controller
        .handle_query("ada", "What's the weather like in Paris today?")
        .await
        .unwrap();

    assert_eq!(response.answer, OFF_TOPIC_REFUSAL);
    assert_ne!(OFF_TOPIC_REFUSAL, HARMFUL_REFUSAL);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_invalid_learner_id() {
    let backend = ScriptedBackend::new(vec![answer("never")]);
    let h = default_harness(backend.clone(), CountingSandbox::new(""));

    let err = h
        .controller
        .handle_query("../etc/passwd", QUESTION)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::InvalidLearnerId { .. }));
    assert_eq!(backend.calls(), 0);
}

/// Feedback collected between begin and complete drives the update
#[tokio::test]
async fn test_feedback_overrides_heuristic() {
    let backend = ScriptedBackend::new(vec![answer("A list comprehension builds a list.")]);
    let h = default_harness(backend, CountingSandbox::new(""));

    let interaction = h.controller.begin("ada", QUESTION).await.unwrap();
    assert_eq!(interaction.termination_reason(), TerminationReason::Answered);
    assert_eq!(interaction.answer(), "A list comprehension builds a list.");

    let feedback = LearnerFeedback {
        correct: Some(false),
        rating: Some(1),
    };
    interaction.complete(Some(feedback)).await.unwrap();

    let stored = h.profiles.persisted("ada").await.unwrap();
    assert_eq!(stored.history[0].reward, 0.0);
    assert_eq!(stored.reward_ema, 0.0);
    assert_eq!(stored.streak_low, 1);
}

/// Two sessions of one learner never lose each other's updates
#[tokio::test]
async fn test_concurrent_sessions_same_learner() {
    let backend = ScriptedBackend::new((0..8).map(|i| answer(&format!("answer {}", i))).collect());
    let h = Arc::new(default_harness(backend, CountingSandbox::new("")));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.controller.handle_query("ada", QUESTION).await.map(|r| r.answer)
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = h.profiles.persisted("ada").await.unwrap();
    assert_eq!(stored.interactions, 8);
    let sequences: Vec<u64> = stored.history.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());
}

/// Replaying the same outcomes from scratch reproduces the profile exactly
#[tokio::test]
async fn test_replay_is_deterministic() {
    let outcomes = [
        LearnerFeedback {
            correct: Some(true),
            rating: Some(5),
        },
        LearnerFeedback {
            correct: Some(true),
            rating: None,
        },
        LearnerFeedback {
            correct: None,
            rating: Some(2),
        },
        LearnerFeedback {
            correct: Some(false),
            rating: Some(3),
        },
    ];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let backend = ScriptedBackend::new(outcomes.iter().map(|_| answer("ok")).collect());
        let h = default_harness(backend, CountingSandbox::new(""));
        for feedback in outcomes {
            h.controller
                .handle_query_with_feedback("ada", QUESTION, Some(feedback))
                .await
                .unwrap();
        }
        runs.push(h.profiles.persisted("ada").await.unwrap());
    }

    assert_eq!(runs[0], runs[1]);
}
