//! Dispatch of validated tool calls
//!
//! ```text
//!  execute(tool_name, input)
//!        │
//!        ├─ unknown name ───────────────► Rejected
//!        ├─ SafetyValidator::validate ──► Rejected   (nothing runs)
//!        │
//!        ├─ run_python ─► CodeSandbox::run ─► Success / Error / Timeout
//!        │                 spawn failure ───► Error + fatal
//!        │
//!        └─ web_search ─► RateLimiter ─► SearchBackend::search
//!                                         ─► Success / Error / Timeout
//! ```
//!
//! Every call is recorded in `tool_calls_total{tool,status}` and
//! `tool_duration_seconds{tool}`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;
use super::sandbox::{truncate_output, CodeSandbox, SandboxLimits, SandboxRequest};
use super::search::{SearchBackend, SearchConfig};
use super::types::{ToolKind, ToolResult};
use crate::metrics::{SAFETY_REJECTIONS, TOOL_CALLS, TOOL_DURATION};
use crate::safety::{RejectionRule, SafetyValidator};

/// Slack on top of the sandbox's own timeout before the executor gives up
const SANDBOX_GRACE: Duration = Duration::from_secs(1);

/// Runs tool calls behind the safety validator
pub struct ToolExecutor {
    validator: SafetyValidator,
    sandbox: Arc<dyn CodeSandbox>,
    search: Arc<dyn SearchBackend>,
    limits: SandboxLimits,
    search_config: SearchConfig,
    search_limiter: RateLimiter,
}

impl ToolExecutor {
    pub fn new(
        validator: SafetyValidator,
        sandbox: Arc<dyn CodeSandbox>,
        search: Arc<dyn SearchBackend>,
        limits: SandboxLimits,
        search_config: SearchConfig,
    ) -> Self {
        let search_limiter =
            RateLimiter::new(search_config.rate_limit_burst, search_config.rate_limit_per_sec);
        Self {
            validator,
            sandbox,
            search,
            limits,
            search_config,
            search_limiter,
        }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Validate and run one tool call
    ///
    /// Never returns an error: every failure mode is a `ToolResult` the
    /// reasoning loop can observe. Infrastructure faults carry `fatal`.
    ///
    /// # Arguments
    /// * `tool_name` - Name as emitted by the model
    /// * `input` - Code or query text
    pub async fn execute(&self, tool_name: &str, input: &str) -> ToolResult {
        let start = Instant::now();

        let Some(kind) = ToolKind::from_name(tool_name) else {
            SAFETY_REJECTIONS
                .with_label_values(&[RejectionRule::UnknownTool.as_str()])
                .inc();
            warn!(tool = %tool_name, "Unknown tool requested");
            let result = ToolResult::rejected(
                tool_name,
                format!(
                    "unknown tool '{}'; available tools: {}",
                    tool_name,
                    ToolKind::ALL.map(ToolKind::as_str).join(", ")
                ),
            );
            return self.finish("unknown", result, start);
        };

        if let Err(rejection) = self.validator.validate(kind.input_class(), input) {
            info!(tool = %kind, rule = rejection.rule.as_str(), "Tool input rejected");
            let result = ToolResult::rejected(kind.as_str(), rejection.reason);
            return self.finish(kind.as_str(), result, start);
        }

        let result = match kind {
            ToolKind::RunPython => self.run_python(input).await,
            ToolKind::WebSearch => self.web_search(input).await,
        };
        self.finish(kind.as_str(), result, start)
    }

    async fn run_python(&self, code: &str) -> ToolResult {
        let tool = ToolKind::RunPython.as_str();
        let request = SandboxRequest::new(code, &self.limits);
        let backstop = request.timeout + SANDBOX_GRACE;

        let output = match tokio::time::timeout(backstop, self.sandbox.run(&request)).await {
            Err(_) => {
                warn!(timeout_ms = self.limits.timeout_ms, "Sandbox did not return within its budget");
                return ToolResult::timeout(
                    tool,
                    format!("Execution exceeded the {} ms limit", self.limits.timeout_ms),
                );
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Sandbox infrastructure failure");
                return ToolResult::error(tool, e.to_string()).into_fatal();
            }
            Ok(Ok(output)) => output,
        };

        if output.timed_out {
            return ToolResult::timeout(
                tool,
                format!("Execution exceeded the {} ms limit", self.limits.timeout_ms),
            );
        }

        if output.exit_code == 0 {
            let mut text = if output.stdout.trim().is_empty() {
                "Execution succeeded with no output.".to_string()
            } else {
                output.stdout
            };
            if !output.stderr.trim().is_empty() {
                text.push_str("\n[stderr]\n");
                text.push_str(&output.stderr);
            }
            return ToolResult::success(tool, text);
        }

        let detail = match (output.signal, output.stderr.trim().is_empty()) {
            (Some(signal), true) => format!(
                "Process terminated by signal {} (likely a resource limit)",
                signal
            ),
            (_, true) => format!("Process exited with code {}", output.exit_code),
            (_, false) => output.stderr,
        };
        ToolResult::error(tool, detail)
    }

    async fn web_search(&self, query: &str) -> ToolResult {
        let tool = ToolKind::WebSearch.as_str();

        if !self.search_limiter.try_acquire() {
            return ToolResult::error(
                tool,
                format!(
                    "Search rate limit reached; retry after {:?}",
                    self.search_limiter.retry_after()
                ),
            );
        }

        let budget = Duration::from_millis(self.search_config.timeout_ms);
        match tokio::time::timeout(budget, self.search.search(query.trim())).await {
            Err(_) => ToolResult::timeout(
                tool,
                format!("Search exceeded the {} ms limit", self.search_config.timeout_ms),
            ),
            Ok(Err(e)) => {
                warn!(backend = self.search.name(), error = %e, "Search backend failed");
                ToolResult::error(tool, e.to_string())
            }
            Ok(Ok(results)) => {
                let mut results = results;
                results.hits.truncate(self.search_config.max_results);
                ToolResult::success(
                    tool,
                    truncate_output(&results.render(), self.limits.max_output_bytes),
                )
            }
        }
    }

    fn finish(&self, tool: &str, result: ToolResult, start: Instant) -> ToolResult {
        let elapsed = start.elapsed();
        TOOL_CALLS
            .with_label_values(&[tool, result.status().as_str()])
            .inc();
        TOOL_DURATION
            .with_label_values(&[tool])
            .observe(elapsed.as_secs_f64());
        debug!(
            tool = %tool,
            status = %result.status(),
            fatal = result.is_fatal(),
            duration_ms = elapsed.as_millis() as u64,
            "Tool call finished"
        );
        result.with_duration_ms(elapsed.as_secs_f64() * 1000.0)
    }
}
