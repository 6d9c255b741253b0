//! Prometheus metrics for the tutor agent
//!
//! All metrics live in the default registry and are exported with the
//! `tutorloop_` prefix. Call `gather_text()` to render them in the Prometheus
//! text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Interaction Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Completed interactions by how the reasoning loop ended.
    ///
    /// Labels:
    /// - termination_reason: answered, step_budget_exhausted, safety_rejected,
    ///   tool_fatal_error, backend_error
    pub static ref INTERACTIONS: CounterVec = register_counter_vec!(
        "tutorloop_interactions_total",
        "Learner interactions by termination reason",
        &["termination_reason"]
    ).expect("failed to register INTERACTIONS metric");

    /// Think cycles used per interaction.
    pub static ref LOOP_STEPS: Histogram = register_histogram!(
        "tutorloop_loop_steps",
        "Think/Act/Observe cycles per interaction",
        vec![1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0]
    ).expect("failed to register LOOP_STEPS metric");

    /// Generation backend latency.
    pub static ref GENERATION_DURATION: HistogramVec = register_histogram_vec!(
        "tutorloop_generation_duration_seconds",
        "Generation backend call duration",
        &["model"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register GENERATION_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Tool Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tool invocations by tool and result status.
    ///
    /// Labels:
    /// - tool: run_python, web_search, unknown
    /// - status: success, error, timeout, rejected
    pub static ref TOOL_CALLS: CounterVec = register_counter_vec!(
        "tutorloop_tool_calls_total",
        "Tool invocations by tool and status",
        &["tool", "status"]
    ).expect("failed to register TOOL_CALLS metric");

    /// Wall-clock time per tool call, rejections included.
    pub static ref TOOL_DURATION: HistogramVec = register_histogram_vec!(
        "tutorloop_tool_duration_seconds",
        "Tool execution duration",
        &["tool"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).expect("failed to register TOOL_DURATION metric");

    /// Inputs refused by the safety validator, by rule.
    pub static ref SAFETY_REJECTIONS: CounterVec = register_counter_vec!(
        "tutorloop_safety_rejections_total",
        "Inputs rejected before execution",
        &["rule"]
    ).expect("failed to register SAFETY_REJECTIONS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Adaptation / Storage Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Skill level changes made by the policy.
    ///
    /// Labels:
    /// - direction: promote, demote
    pub static ref SKILL_TRANSITIONS: CounterVec = register_counter_vec!(
        "tutorloop_skill_transitions_total",
        "Skill level transitions",
        &["direction"]
    ).expect("failed to register SKILL_TRANSITIONS metric");

    /// Profile persistence failures.
    ///
    /// Labels:
    /// - operation: load, save
    pub static ref PROFILE_STORE_ERRORS: CounterVec = register_counter_vec!(
        "tutorloop_profile_store_errors_total",
        "Profile store failures by operation",
        &["operation"]
    ).expect("failed to register PROFILE_STORE_ERRORS metric");
}

/// Render every registered metric in Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_touched_metrics() {
        SKILL_TRANSITIONS.with_label_values(&["promote"]).inc_by(0.0);
        let text = gather_text();
        assert!(text.contains("tutorloop_skill_transitions_total"));
    }
}
