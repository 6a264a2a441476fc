//! Repeated tool-iteration detection
//!
//! A model can get stuck calling the same tools and getting the same
//! answers. The guard fingerprints each iteration by tool names and the
//! head of each output, and trips when the same fingerprint is seen on
//! consecutive iterations.

use serde_json::Value;

use super::structured::structured_text_payload;
use crate::tools::ExecutionRecord;
use crate::utils::string::prefix_chars;

/// Consecutive identical iterations that trip the guard.
pub const MAX_REPEATED_TOOL_ITERATIONS: usize = 3;

/// Output characters that contribute to an iteration signature.
const SIGNATURE_OUTPUT_CHARS: usize = 240;
/// Output characters quoted in the fallback answer.
const SUMMARY_OUTPUT_CHARS: usize = 400;
/// Tool names quoted in the fallback answer.
const SUMMARY_TOOL_NAMES: usize = 4;

/// Tracks tool iterations within one turn.
#[derive(Debug, Clone, Default)]
pub struct ToolLoopGuard {
    last_signature: Option<String>,
    repeats: usize,
    tool_names: Vec<String>,
    last_output: Option<String>,
}

impl ToolLoopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration; returns `true` once the same signature has
    /// been seen on [`MAX_REPEATED_TOOL_ITERATIONS`] consecutive iterations.
    pub fn observe(&mut self, records: &[ExecutionRecord]) -> bool {
        self.tool_names
            .extend(records.iter().map(|r| r.tool_name.clone()));
        if let Some(last) = records.last() {
            self.last_output = Some(record_output(last));
        }

        let signature = iteration_signature(records);
        if self.last_signature.as_deref() == Some(signature.as_str()) {
            self.repeats += 1;
        } else {
            self.last_signature = Some(signature);
            self.repeats = 1;
        }
        self.repeats >= MAX_REPEATED_TOOL_ITERATIONS
    }

    /// Consecutive iterations with the current signature.
    pub fn repeats(&self) -> usize {
        self.repeats
    }

    /// Every tool name seen this turn, in call order.
    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    /// The answer returned when the turn is cut short.
    pub fn fallback_text(&self) -> String {
        let tools_used = if self.tool_names.is_empty() {
            "tools".to_string()
        } else {
            let start = self.tool_names.len().saturating_sub(SUMMARY_TOOL_NAMES);
            self.tool_names[start..].join(", ")
        };
        let summary = match &self.last_output {
            Some(output) => prefix_chars(output, SUMMARY_OUTPUT_CHARS),
            None => "no tool output available".to_string(),
        };
        format!(
            "I executed tool calls but hit an internal tool-loop safeguard before finalizing. \
             Recent tools: {}. Last tool output: {}",
            tools_used, summary
        )
    }

    /// [`fallback_text`](Self::fallback_text), wrapped in the structured
    /// answer shape when a schema is in use.
    pub fn fallback_payload(&self, structured: bool) -> Value {
        let text = self.fallback_text();
        if structured {
            structured_text_payload(&text)
        } else {
            Value::String(text)
        }
    }
}

fn record_output(record: &ExecutionRecord) -> String {
    record.payload.tool_output().unwrap_or_default().to_string()
}

/// Fingerprint of one iteration: `name:output-head` per call, joined by `|`.
pub fn iteration_signature(records: &[ExecutionRecord]) -> String {
    records
        .iter()
        .map(|r| {
            format!(
                "{}:{}",
                r.tool_name,
                prefix_chars(&record_output(r), SIGNATURE_OUTPUT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("|")
}
