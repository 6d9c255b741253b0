//! Screening policy: size limits and deny-lists
//!
//! Everything the validator enforces is data in this struct, so deployments
//! can tighten or relax screening without touching the validator itself.

use serde::{Deserialize, Serialize};

/// Static screening configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyPolicy {
    /// Maximum code size in bytes
    pub max_code_bytes: usize,
    /// Maximum number of code lines
    pub max_code_lines: usize,
    /// Maximum search query length in characters
    pub max_query_chars: usize,
    /// Maximum learner question size in bytes
    pub max_question_bytes: usize,
    /// Top-level modules that may not be imported
    pub disallowed_modules: Vec<String>,
    /// Builtins that may not be called
    pub disallowed_calls: Vec<String>,
    /// Dunder attributes that give a way out of the restricted namespace
    pub disallowed_attributes: Vec<String>,
    /// Reject `while True`-style loops whose body has no exit
    pub reject_unbounded_loops: bool,
    /// Phrases that make a question harmful regardless of topic
    pub harmful_phrases: Vec<String>,
    /// Refuse questions that do not look like programming questions
    pub require_programming_topic: bool,
    /// Keywords that mark a question as programming-related
    pub topic_keywords: Vec<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            max_code_bytes: 8 * 1024,
            max_code_lines: 400,
            max_query_chars: 256,
            max_question_bytes: 4 * 1024,
            disallowed_modules: to_strings(&[
                "os",
                "sys",
                "subprocess",
                "socket",
                "shutil",
                "pathlib",
                "ctypes",
                "multiprocessing",
                "threading",
                "signal",
                "pty",
                "urllib",
                "http",
                "requests",
                "ftplib",
                "smtplib",
                "importlib",
                "builtins",
                "inspect",
                "pickle",
                "marshal",
                "tempfile",
                "glob",
                "io",
                "asyncio",
                "resource",
                "gc",
            ]),
            disallowed_calls: to_strings(&[
                "open",
                "exec",
                "eval",
                "compile",
                "__import__",
                "input",
                "breakpoint",
                "globals",
                "locals",
                "vars",
                "getattr",
                "setattr",
                "delattr",
                "memoryview",
            ]),
            disallowed_attributes: to_strings(&[
                "__class__",
                "__subclasses__",
                "__bases__",
                "__mro__",
                "__globals__",
                "__builtins__",
                "__code__",
                "__dict__",
                "__loader__",
                "__self__",
                "__getattribute__",
                "__reduce__",
                "__reduce_ex__",
                "__subclasshook__",
            ]),
            reject_unbounded_loops: true,
            harmful_phrases: to_strings(&[
                "suicide",
                "kill myself",
                "self-harm",
                "self harm",
                "harm others",
                "bomb",
                "explosive",
                "weapon",
                "terrorist",
            ]),
            require_programming_topic: true,
            topic_keywords: to_strings(&[
                "python",
                "code",
                "program",
                "variable",
                "function",
                "loop",
                "for ",
                "while ",
                "list",
                "tuple",
                "dictionary",
                "dict",
                "set",
                "string",
                "class",
                "object",
                "method",
                "error",
                "exception",
                "traceback",
                "recursion",
                "algorithm",
                "import",
                "module",
                "def ",
                "print(",
                "append(",
                "len(",
                "index",
                "syntax",
                "debug",
            ]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
