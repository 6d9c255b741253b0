//! Pre-execution input screening
//!
//! The validator is a pure function of `(input class, input, policy)`. It
//! never looks at the learner profile and never runs anything, so a rejected
//! input has had no side effects at all.
//!
//! # Checks
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────────────────────┐
//! │ all inputs    │ empty, NUL bytes, size limits                        │
//! │ code          │ disallowed imports, builtins, dunder escapes,        │
//! │               │ `while True` loops with no break/return/raise        │
//! │ search query  │ length limit, single line                            │
//! │ question      │ harmful phrases, programming-topic heuristic         │
//! └───────────────┴──────────────────────────────────────────────────────┘
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::policy::SafetyPolicy;
use crate::metrics::SAFETY_REJECTIONS;

lazy_static! {
    /// `import a, b.c as d`
    static ref IMPORT_RE: Regex =
        Regex::new(r"^\s*import\s+(.+)$").expect("valid import pattern");
    /// `from a.b import c`
    static ref FROM_IMPORT_RE: Regex =
        Regex::new(r"^\s*from\s+([A-Za-z_][\w\.]*)\s+import\b").expect("valid from-import pattern");
    /// `while True:` / `while 1:` / `while not False:` with optional inline body
    static ref FOREVER_LOOP_RE: Regex =
        Regex::new(r"^(\s*)while\s*\(?\s*(?:True|1|not\s+False)\s*\)?\s*:(.*)$")
            .expect("valid loop pattern");
    /// Statements that leave a loop
    static ref LOOP_EXIT_RE: Regex =
        Regex::new(r"\b(?:break|return|raise)\b|\b(?:sys\.)?exit\s*\(").expect("valid exit pattern");
}

/// What kind of input is being screened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    /// Source code bound for the sandbox
    Code,
    /// Query bound for the search backend
    SearchQuery,
}

/// Which check refused the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionRule {
    Empty,
    Malformed,
    TooLarge,
    DisallowedImport,
    DisallowedCall,
    DisallowedAttribute,
    UnboundedLoop,
    UnknownTool,
    HarmfulContent,
    OffTopic,
}

impl RejectionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionRule::Empty => "empty",
            RejectionRule::Malformed => "malformed",
            RejectionRule::TooLarge => "too_large",
            RejectionRule::DisallowedImport => "disallowed_import",
            RejectionRule::DisallowedCall => "disallowed_call",
            RejectionRule::DisallowedAttribute => "disallowed_attribute",
            RejectionRule::UnboundedLoop => "unbounded_loop",
            RejectionRule::UnknownTool => "unknown_tool",
            RejectionRule::HarmfulContent => "harmful_content",
            RejectionRule::OffTopic => "off_topic",
        }
    }
}

/// A refused input and the reason it was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub rule: RejectionRule,
    pub reason: String,
}

impl Rejection {
    pub fn new(rule: RejectionRule, reason: impl Into<String>) -> Self {
        Self {
            rule,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rejected ({}): {}", self.rule.as_str(), self.reason)
    }
}

impl std::error::Error for Rejection {}

/// Refusal shown when a question touches harmful topics
pub const HARMFUL_REFUSAL: &str = "I can't help with harmful or unsafe topics. \
If you are in distress, please reach out to someone you trust or a professional support line.";

/// Refusal shown when a question is not about programming
pub const OFF_TOPIC_REFUSAL: &str = "I'm here to help you learn programming. \
Could you rephrase your question so it is about code or programming concepts?";

/// Static screening of tool inputs and learner questions
#[derive(Debug, Clone)]
pub struct SafetyValidator {
    policy: SafetyPolicy,
}

impl SafetyValidator {
    pub fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Screen a tool input before anything is executed
    ///
    /// Deterministic: the same `(class, input)` always gets the same verdict.
    pub fn validate(&self, class: InputClass, input: &str) -> Result<(), Rejection> {
        let result = self.check_common(input).and_then(|()| match class {
            InputClass::Code => self.check_code(input),
            InputClass::SearchQuery => self.check_query(input),
        });
        if let Err(ref rejection) = result {
            record(rejection);
        }
        result
    }

    /// Screen the learner's question itself
    ///
    /// Returns the refusal message to show the learner on rejection.
    pub fn screen_question(&self, question: &str) -> Result<(), (Rejection, &'static str)> {
        let result = self.check_question(question);
        if let Err((ref rejection, _)) = result {
            record(rejection);
        }
        result
    }

    fn check_question(&self, question: &str) -> Result<(), (Rejection, &'static str)> {
        if question.trim().is_empty() {
            return Err((
                Rejection::new(RejectionRule::Empty, "question is empty"),
                OFF_TOPIC_REFUSAL,
            ));
        }
        if question.len() > self.policy.max_question_bytes {
            return Err((
                Rejection::new(
                    RejectionRule::TooLarge,
                    format!(
                        "question is {} bytes, limit is {}",
                        question.len(),
                        self.policy.max_question_bytes
                    ),
                ),
                OFF_TOPIC_REFUSAL,
            ));
        }

        let text = question.to_lowercase();
        if let Some(phrase) = self
            .policy
            .harmful_phrases
            .iter()
            .find(|p| text.contains(p.as_str()))
        {
            return Err((
                Rejection::new(
                    RejectionRule::HarmfulContent,
                    format!("question mentions '{}'", phrase),
                ),
                HARMFUL_REFUSAL,
            ));
        }

        if self.policy.require_programming_topic
            && !self
                .policy
                .topic_keywords
                .iter()
                .any(|k| text.contains(k.as_str()))
        {
            return Err((
                Rejection::new(
                    RejectionRule::OffTopic,
                    "question does not look like a programming question",
                ),
                OFF_TOPIC_REFUSAL,
            ));
        }
        Ok(())
    }

    fn check_common(&self, input: &str) -> Result<(), Rejection> {
        if input.trim().is_empty() {
            return Err(Rejection::new(RejectionRule::Empty, "input is empty"));
        }
        if input.contains('\0') {
            return Err(Rejection::new(
                RejectionRule::Malformed,
                "input contains NUL bytes",
            ));
        }
        Ok(())
    }

    fn check_query(&self, query: &str) -> Result<(), Rejection> {
        let chars = query.chars().count();
        if chars > self.policy.max_query_chars {
            return Err(Rejection::new(
                RejectionRule::TooLarge,
                format!(
                    "query is {} characters, limit is {}",
                    chars, self.policy.max_query_chars
                ),
            ));
        }
        if query.contains('\n') {
            return Err(Rejection::new(
                RejectionRule::Malformed,
                "query must be a single line",
            ));
        }
        Ok(())
    }

    fn check_code(&self, code: &str) -> Result<(), Rejection> {
        if code.len() > self.policy.max_code_bytes {
            return Err(Rejection::new(
                RejectionRule::TooLarge,
                format!(
                    "code is {} bytes, limit is {}",
                    code.len(),
                    self.policy.max_code_bytes
                ),
            ));
        }
        let line_count = code.lines().count();
        if line_count > self.policy.max_code_lines {
            return Err(Rejection::new(
                RejectionRule::TooLarge,
                format!(
                    "code has {} lines, limit is {}",
                    line_count, self.policy.max_code_lines
                ),
            ));
        }

        for module in imported_modules(code) {
            if self.policy.disallowed_modules.iter().any(|m| *m == module) {
                return Err(Rejection::new(
                    RejectionRule::DisallowedImport,
                    format!("import of module '{}' is not allowed", module),
                ));
            }
        }

        for name in &self.policy.disallowed_calls {
            if calls_builtin(code, name) {
                return Err(Rejection::new(
                    RejectionRule::DisallowedCall,
                    format!("call to '{}' is not allowed", name),
                ));
            }
        }

        for attr in &self.policy.disallowed_attributes {
            if code.contains(attr.as_str()) {
                return Err(Rejection::new(
                    RejectionRule::DisallowedAttribute,
                    format!("use of '{}' is not allowed", attr),
                ));
            }
        }

        if self.policy.reject_unbounded_loops {
            if let Some(line) = unbounded_loop_line(code) {
                return Err(Rejection::new(
                    RejectionRule::UnboundedLoop,
                    format!("infinite loop without break on line {}", line),
                ));
            }
        }

        Ok(())
    }
}

impl Default for SafetyValidator {
    fn default() -> Self {
        Self::new(SafetyPolicy::default())
    }
}

fn record(rejection: &Rejection) {
    SAFETY_REJECTIONS
        .with_label_values(&[rejection.rule.as_str()])
        .inc();
    debug!(rule = rejection.rule.as_str(), reason = %rejection.reason, "Input rejected");
}

/// Top-level module names brought in by `import` / `from ... import`
fn imported_modules(code: &str) -> Vec<String> {
    let mut modules = Vec::new();
    for raw_line in code.lines() {
        // `import a; import b` on one line
        for line in raw_line.split(';') {
            if let Some(caps) = FROM_IMPORT_RE.captures(line) {
                if let Some(m) = caps.get(1) {
                    modules.push(top_level(m.as_str()));
                }
            } else if let Some(caps) = IMPORT_RE.captures(line) {
                if let Some(m) = caps.get(1) {
                    let list = m.as_str().split('#').next().unwrap_or_default();
                    for item in list.split(',') {
                        let name = item.split_whitespace().next().unwrap_or_default();
                        if !name.is_empty() {
                            modules.push(top_level(name));
                        }
                    }
                }
            }
        }
    }
    modules
}

fn top_level(dotted: &str) -> String {
    dotted
        .trim_matches(|c: char| c == '(' || c == ')')
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// True if `name(` appears as a bare call (not `obj.name(` or `my_name(`)
///
/// Dunder names count as calls even after a dot, since `x.__import__(` reaches
/// the same builtin.
fn calls_builtin(code: &str, name: &str) -> bool {
    let dotted_counts = name.starts_with("__");
    let mut search_from = 0;
    while let Some(offset) = code[search_from..].find(name) {
        let start = search_from + offset;
        let end = start + name.len();
        search_from = end;

        let preceded_ok = code[..start]
            .chars()
            .next_back()
            .map_or(true, |c| {
                !(c.is_alphanumeric() || c == '_' || (c == '.' && !dotted_counts))
            });
        if !preceded_ok {
            continue;
        }
        let rest = code[end..].trim_start_matches([' ', '\t']);
        if rest.starts_with('(') {
            return true;
        }
    }
    false
}

/// 1-based line number of the first `while True` loop with no way out
fn unbounded_loop_line(code: &str) -> Option<usize> {
    let lines: Vec<&str> = code.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = FOREVER_LOOP_RE.captures(strip_comment(line)) else {
            continue;
        };
        let indent = caps.get(1).map_or(0, |m| indent_width(m.as_str()));
        let inline_body = caps.get(2).map_or("", |m| m.as_str()).trim();

        let has_exit = if !inline_body.is_empty() {
            LOOP_EXIT_RE.is_match(inline_body)
        } else {
            lines[idx + 1..]
                .iter()
                .map(|l| strip_comment(l))
                .filter(|l| !l.trim().is_empty())
                .take_while(|l| indent_width(l) > indent)
                .any(|l| LOOP_EXIT_RE.is_match(l))
        };

        if !has_exit {
            return Some(idx + 1);
        }
    }
    None
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or_default()
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}
