//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["runtime", "llm", "logging"];

const KNOWN_RUNTIME: &[&str] = &[
    "max_tool_iterations",
    "timeout_secs",
    "min_timeout_secs",
    "allowed_append_message_tools",
    "allow_system_inserts",
    "managed_files_root",
    "structured_output_max_attempts",
    "parallel_tool_calls",
];

const KNOWN_LLM: &[&str] = &[
    "model",
    "system_prompt",
    "system_prompt_file",
    "temperature",
    "max_output_tokens",
    "api_mode",
    "prompt_cache_enabled",
    "reasoning_effort",
];

const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];

const KNOWN_API_MODES: &[&str] = &["chat_completions", "responses"];

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

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
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
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
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

fn unknown_field(path: String, key: &str, known: &[&str]) -> Diagnostic {
    let msg = match suggest_field(key, known) {
        Some(suggestion) => format!("Unknown field '{}': {}", key, suggestion),
        None => format!("Unknown field '{}'", key),
    };
    Diagnostic::new(DiagnosticLevel::Error, path, msg)
}

fn check_section(
    obj: &serde_json::Map<String, Value>,
    section: &str,
    known: &[&str],
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let Some(fields) = obj.get(section).and_then(Value::as_object) else {
        return false;
    };
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in fields.keys() {
        if !known_set.contains(key.as_str()) {
            has_unknown = true;
            diagnostics.push(unknown_field(format!("{}.{}", section, key), key, known));
        }
    }
    has_unknown
}

fn check_positive(
    obj: &serde_json::Map<String, Value>,
    section: &str,
    field: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let value = obj.get(section).and_then(|s| s.get(field));
    if let Some(v) = value {
        if v.as_u64().map(|n| n == 0).unwrap_or(true) {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                format!("{}.{}", section, field),
                "Must be a positive integer",
            ));
        }
    }
}

/// Validate a raw JSON config value against known field names and limits.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let known_set: HashSet<&str> = KNOWN_TOP_LEVEL.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if !known_set.contains(key.as_str()) {
            has_unknown = true;
            diagnostics.push(unknown_field(key.clone(), key, KNOWN_TOP_LEVEL));
        }
    }
    has_unknown |= check_section(obj, "runtime", KNOWN_RUNTIME, &mut diagnostics);
    has_unknown |= check_section(obj, "llm", KNOWN_LLM, &mut diagnostics);
    has_unknown |= check_section(obj, "logging", KNOWN_LOGGING, &mut diagnostics);

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    // Limits
    check_positive(obj, "runtime", "max_tool_iterations", &mut diagnostics);
    check_positive(obj, "runtime", "timeout_secs", &mut diagnostics);
    check_positive(obj, "runtime", "structured_output_max_attempts", &mut diagnostics);

    if let Some(mode) = obj.get("llm").and_then(|l| l.get("api_mode")) {
        let valid = mode
            .as_str()
            .map(|m| KNOWN_API_MODES.contains(&m))
            .unwrap_or(false);
        if !valid {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "llm.api_mode",
                format!("Must be one of: {}", KNOWN_API_MODES.join(", ")),
            ));
        }
    }

    // Trust policy warnings
    let runtime = obj.get("runtime");
    let system_inserts = runtime
        .and_then(|r| r.get("allow_system_inserts"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if system_inserts {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "runtime.allow_system_inserts",
            "Trusted tools may insert system messages",
        ));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors(diags: &[Diagnostic]) -> Vec<&Diagnostic> {
        diags
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("runtime", "runtime"), 0);
        assert_eq!(levenshtein("runtme", "runtime"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_suggest_field() {
        assert_eq!(
            suggest_field("runtme", KNOWN_TOP_LEVEL),
            Some("did you mean 'runtime'?".to_string())
        );
        assert_eq!(suggest_field("zzzzzzzzzz", KNOWN_TOP_LEVEL), None);
    }

    #[test]
    fn test_valid_config() {
        let diags = validate_config(&json!({
            "runtime": {"max_tool_iterations": 4},
            "llm": {"api_mode": "responses"}
        }));
        assert!(errors(&diags).is_empty());
        assert!(diags.iter().any(|d| d.message == "All fields recognized"));
    }

    #[test]
    fn test_not_an_object() {
        let diags = validate_config(&json!([1, 2]));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].level, DiagnosticLevel::Error);
    }

    #[test]
    fn test_unknown_section_field_with_suggestion() {
        let diags = validate_config(&json!({"runtime": {"max_tool_iteration": 4}}));
        let errs = errors(&diags);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].path, "runtime.max_tool_iteration");
        assert!(errs[0].message.contains("did you mean 'max_tool_iterations'?"));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let diags = validate_config(&json!({"runtime": {"max_tool_iterations": 0, "timeout_secs": -1}}));
        let paths: Vec<&str> = errors(&diags).iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"runtime.max_tool_iterations"));
        assert!(paths.contains(&"runtime.timeout_secs"));
    }

    #[test]
    fn test_bad_api_mode() {
        let diags = validate_config(&json!({"llm": {"api_mode": "completions"}}));
        assert!(errors(&diags).iter().any(|d| d.path == "llm.api_mode"));
    }

    #[test]
    fn test_system_inserts_warning() {
        let diags = validate_config(&json!({"runtime": {"allow_system_inserts": true}}));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn && d.path == "runtime.allow_system_inserts"));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticLevel::Warn, "llm.model", "Deprecated");
        assert_eq!(d.to_string(), "[WARN] llm.model: Deprecated");
        let d = Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON");
        assert_eq!(d.to_string(), "[OK] Valid JSON");
    }
}
