//! Tool identifiers and the structured result every tool call produces

use serde::{Deserialize, Serialize};

use crate::safety::InputClass;

/// The closed set of tools the tutor can invoke
///
/// Adding a tool means adding a variant here and a branch in
/// `ToolExecutor::execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Run a Python snippet in the sandbox
    RunPython,
    /// Look something up with the search backend
    WebSearch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::RunPython, ToolKind::WebSearch];

    /// Canonical name used in prompts and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::RunPython => "run_python",
            ToolKind::WebSearch => "web_search",
        }
    }

    /// Resolve a tool name emitted by the model
    ///
    /// A few spellings models commonly use are accepted as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "run_python" | "python" | "execute_code" | "run_code" => Some(ToolKind::RunPython),
            "web_search" | "search" | "websearch" => Some(ToolKind::WebSearch),
            _ => None,
        }
    }

    /// Screening class for this tool's input
    pub fn input_class(self) -> InputClass {
        match self {
            ToolKind::RunPython => InputClass::Code,
            ToolKind::WebSearch => InputClass::SearchQuery,
        }
    }

    /// One-line description for the system prompt
    pub fn description(self) -> &'static str {
        match self {
            ToolKind::RunPython => {
                "run_python(code): execute a small Python snippet in an isolated sandbox and see stdout/stderr"
            }
            ToolKind::WebSearch => {
                "web_search(query): look up Python documentation, concepts, or error messages"
            }
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    /// The tool ran and failed (runtime fault, non-zero exit, backend error)
    Error,
    /// The tool exceeded its time budget and was torn down
    Timeout,
    /// Screening refused the input; nothing was executed
    Rejected,
}

impl ToolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
            ToolStatus::Timeout => "timeout",
            ToolStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of one tool call
///
/// `output` is present iff the status is `Success`; `error_detail` is present
/// for every other status. Fields are private so the pairing cannot be
/// broken after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    tool: String,
    status: ToolStatus,
    output: Option<String>,
    error_detail: Option<String>,
    fatal: bool,
    duration_ms: f64,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, output: impl Into<String>) -> Self {
        Self::build(tool, ToolStatus::Success, Some(output.into()), None)
    }

    pub fn error(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::build(tool, ToolStatus::Error, None, Some(detail.into()))
    }

    pub fn timeout(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::build(tool, ToolStatus::Timeout, None, Some(detail.into()))
    }

    pub fn rejected(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::build(tool, ToolStatus::Rejected, None, Some(detail.into()))
    }

    fn build(
        tool: impl Into<String>,
        status: ToolStatus,
        output: Option<String>,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            status,
            output,
            error_detail,
            fatal: false,
            duration_ms: 0.0,
        }
    }

    /// Mark an infrastructure fault that should end the reasoning loop
    pub fn into_fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn status(&self) -> ToolStatus {
        self.status
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Text fed back to the model as the observation
    pub fn render(&self) -> String {
        match self.status {
            ToolStatus::Success => format!(
                "Tool '{}' succeeded:\n{}",
                self.tool,
                self.output.as_deref().unwrap_or_default()
            ),
            status => format!(
                "Tool '{}' {}:\n{}",
                self.tool,
                match status {
                    ToolStatus::Timeout => "timed out",
                    ToolStatus::Rejected => "was rejected before running",
                    _ => "failed",
                },
                self.error_detail.as_deref().unwrap_or_default()
            ),
        }
    }
}
