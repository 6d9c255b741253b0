//! Parsing the model's reply into a loop decision
//!
//! The model is asked for strict JSON:
//!
//! ```text
//! {"thought": "...", "action": "run_python" | "web_search" | "none",
//!  "action_input": "...", "answer": "..."}
//! ```
//!
//! Models do not always comply, so parsing is tolerant: the whole reply is
//! tried first, then every balanced `{...}` object inside it. A reply with
//! no usable JSON is taken as the final answer.

use serde_json::Value;

/// What the model decided to do next
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Final answer for the learner
    Respond {
        thought: Option<String>,
        answer: String,
    },
    /// Call a tool
    Act {
        thought: Option<String>,
        tool: String,
        input: String,
    },
    /// Reasoning only; neither an action nor an answer
    Reflect { thought: String },
}

impl Decision {
    pub fn thought(&self) -> Option<&str> {
        match self {
            Decision::Respond { thought, .. } | Decision::Act { thought, .. } => thought.as_deref(),
            Decision::Reflect { thought } => Some(thought),
        }
    }
}

const KNOWN_KEYS: [&str; 5] = ["thought", "action", "action_input", "answer", "tutor_reply"];

/// Interpret a raw model reply
pub fn parse_decision(raw: &str) -> Decision {
    let content = raw.trim();

    if let Some(decision) = try_parse_decision(content) {
        return decision;
    }
    for candidate in json_objects(content) {
        if let Some(decision) = try_parse_decision(candidate) {
            return decision;
        }
    }

    if content.is_empty() {
        return Decision::Reflect {
            thought: String::new(),
        };
    }
    Decision::Respond {
        thought: None,
        answer: content.to_string(),
    }
}

/// Top-level balanced `{...}` spans, found by brace depth
///
/// Braces inside JSON string literals do not count. Quotes only matter
/// inside an object, so prose around it cannot open a string.
fn json_objects(content: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        objects.push(&content[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    objects
}

fn try_parse_decision(json_str: &str) -> Option<Decision> {
    let value: Value = serde_json::from_str(json_str).ok()?;
    let obj = value.as_object()?;
    if !KNOWN_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return None;
    }

    let thought = non_empty_str(obj.get("thought"));
    let action = non_empty_str(obj.get("action"))
        .map(|a| a.trim().to_string())
        .filter(|a| !a.eq_ignore_ascii_case("none"));
    let answer = non_empty_str(obj.get("answer")).or_else(|| non_empty_str(obj.get("tutor_reply")));

    if let Some(tool) = action {
        return Some(Decision::Act {
            thought,
            tool,
            input: action_input(obj.get("action_input")),
        });
    }
    if let Some(answer) = answer {
        return Some(Decision::Respond { thought, answer });
    }
    thought.map(|thought| Decision::Reflect { thought })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// `action_input` is usually a string; some models nest it as
/// `{"code": ...}` or `{"query": ...}`
fn action_input(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) => ["code", "query", "input"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
