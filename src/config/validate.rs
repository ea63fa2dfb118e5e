//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use super::{ConversationManagerKind, FactoryConfig};

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "model",
    "system_prompt",
    "initial_message",
    "model_config",
    "tool_config_paths",
    "sessions_home",
    "session_id",
    "conversation",
    "activation",
    "agent",
    "logging",
];

const KNOWN_CONVERSATION: &[&str] = &[
    "manager",
    "sliding_window_size",
    "preserve_recent_messages",
    "summary_ratio",
    "should_truncate_results",
    "custom_summarization_prompt",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut found = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        found = true;
        let message = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: format!("{}{}", prefix, key),
            message,
        });
    }
    found
}

/// Validate a raw config value against known field names.
pub fn validate_raw(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            path: String::new(),
            message: "Config must be an object".to_string(),
        });
        return diagnostics;
    };

    let mut has_unknown = unknown_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);
    if let Some(conversation) = obj.get("conversation").and_then(|v| v.as_object()) {
        has_unknown |= unknown_keys(
            conversation,
            KNOWN_CONVERSATION,
            "conversation.",
            &mut diagnostics,
        );
    }

    if !has_unknown {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: "All fields recognized".to_string(),
        });
    }

    diagnostics
}

impl FactoryConfig {
    /// Check semantic constraints and return every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.model.trim().is_empty() {
            problems.push("model: must not be empty".to_string());
        }

        let conv = &self.conversation;
        match conv.manager {
            ConversationManagerKind::SlidingWindow if conv.sliding_window_size == 0 => {
                problems.push("conversation.sliding_window_size: must be at least 1".to_string());
            }
            ConversationManagerKind::Summarizing
                if !(0.1..=0.8).contains(&conv.summary_ratio) =>
            {
                problems.push(format!(
                    "conversation.summary_ratio: {} is outside 0.1-0.8",
                    conv.summary_ratio
                ));
            }
            _ => {}
        }

        if self.activation.max_concurrency == 0 {
            problems.push("activation.max_concurrency: must be at least 1".to_string());
        }

        for path in &self.tool_config_paths {
            if !path.exists() {
                problems.push(format!(
                    "tool_config_paths: '{}' does not exist",
                    path.display()
                ));
            }
        }

        if let Some(name) = &self.session_id {
            if name.is_empty() || name.contains(['/', '\\']) {
                problems.push(format!("session_id: '{}' is not a valid session name", name));
            }
        }

        problems
    }
}
