//! Keyword topic classification for mastery tracking

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Recursion,
    Errors,
    Classes,
    Functions,
    Loops,
    Collections,
    Strings,
    General,
}

impl Topic {
    /// Tie-break order: more specific topics first
    const SCORED: [Topic; 7] = [
        Topic::Recursion,
        Topic::Errors,
        Topic::Classes,
        Topic::Functions,
        Topic::Loops,
        Topic::Collections,
        Topic::Strings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Recursion => "recursion",
            Topic::Errors => "errors",
            Topic::Classes => "classes",
            Topic::Functions => "functions",
            Topic::Loops => "loops",
            Topic::Collections => "collections",
            Topic::Strings => "strings",
            Topic::General => "general",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Topic::Recursion => &["recursion", "recursive", "recurse", "factorial", "fibonacci"],
            Topic::Errors => &[
                "error", "errors", "exception", "exceptions", "traceback", "try", "except",
                "raise", "debug", "bug",
            ],
            Topic::Classes => &[
                "class", "classes", "object", "objects", "method", "methods", "inheritance",
                "self", "init", "attribute", "instance",
            ],
            Topic::Functions => &[
                "function", "functions", "def", "return", "argument", "arguments", "parameter",
                "parameters", "lambda",
            ],
            Topic::Loops => &[
                "loop", "loops", "for", "while", "iterate", "iteration", "range", "break",
                "continue",
            ],
            Topic::Collections => &[
                "list", "lists", "dict", "dictionary", "dictionaries", "tuple", "tuples", "set",
                "sets", "append", "index", "comprehension", "array",
            ],
            Topic::Strings => &[
                "string", "strings", "str", "substring", "split", "join", "format", "character",
                "characters",
            ],
            Topic::General => &[],
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the topic with the most keyword hits; `General` when none match
pub fn classify_topic(question: &str) -> Topic {
    let lowered = question.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut best = (Topic::General, 0usize);
    for topic in Topic::SCORED {
        let hits = words
            .iter()
            .filter(|w| topic.keywords().contains(w))
            .count();
        if hits > best.1 {
            best = (topic, hits);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_topic() {
        assert_eq!(classify_topic("How does a for loop work in Python?"), Topic::Loops);
        assert_eq!(classify_topic("What is a recursive function?"), Topic::Recursion);
        assert_eq!(classify_topic("Why do I get a KeyError exception from my dict?"), Topic::Errors);
        assert_eq!(classify_topic("How do I append to a list?"), Topic::Collections);
        assert_eq!(classify_topic("What does __init__ do in a class?"), Topic::Classes);
        assert_eq!(classify_topic("How do I split a string?"), Topic::Strings);
        assert_eq!(classify_topic("Explain Python to me"), Topic::General);
    }

    #[test]
    fn test_classify_ignores_substrings() {
        // "setup" is not "set"
        assert_eq!(classify_topic("python setup question"), Topic::General);
    }
}
