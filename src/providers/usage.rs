//! Token usage accounting.
//!
//! Providers report usage in a handful of OpenAI-flavoured shapes. This
//! module normalizes one payload into a [`UsageSnapshot`] and sums snapshots
//! across every call in a turn with [`UsageAccumulator`].

use serde_json::Value;

/// Usage and completion status reported for one provider call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    /// Total tokens billed
    pub total: Option<u64>,
    /// Prompt/input tokens
    pub input: Option<u64>,
    /// Completion/output tokens
    pub output: Option<u64>,
    /// Input tokens served from the prompt cache
    pub cached_input: Option<u64>,
    /// Output tokens spent on hidden reasoning
    pub reasoning_output: Option<u64>,
    /// Response status (`completed`, `incomplete`, ...)
    pub status: Option<String>,
    /// Why the response is incomplete, when it is
    pub incomplete_reason: Option<String>,
}

impl UsageSnapshot {
    /// Snapshot carrying only a total.
    pub fn with_total(total: u64) -> Self {
        Self {
            total: Some(total),
            ..Default::default()
        }
    }

    /// Snapshot with input and output counts; the total is derived.
    pub fn with_io(input: u64, output: u64) -> Self {
        Self {
            total: Some(input.saturating_add(output)),
            input: Some(input),
            output: Some(output),
            ..Default::default()
        }
    }

    /// Mark this snapshot as incomplete for `reason`.
    pub fn incomplete(mut self, reason: &str) -> Self {
        self.status = Some("incomplete".to_string());
        self.incomplete_reason = Some(reason.to_string());
        self
    }

    /// Parse a provider response object.
    ///
    /// Reads `usage.{total_tokens, input_tokens, output_tokens}` with the
    /// chat-completions `prompt_tokens`/`completion_tokens` as fallback,
    /// the cached/reasoning detail blocks, `status`, and
    /// `incomplete_details.reason`. A missing total is derived from its parts.
    ///
    /// # Example
    /// ```
    /// use relaybot::providers::UsageSnapshot;
    /// use serde_json::json;
    ///
    /// let usage = UsageSnapshot::from_payload(&json!({
    ///     "usage": {"prompt_tokens": 10, "completion_tokens": 5}
    /// }));
    /// assert_eq!(usage.total, Some(15));
    /// assert_eq!(usage.input, Some(10));
    /// ```
    pub fn from_payload(payload: &Value) -> Self {
        let status = opt_str(payload.get("status"));
        let incomplete_reason = opt_str(
            payload
                .get("incomplete_details")
                .and_then(|details| details.get("reason")),
        );

        let Some(usage) = payload.get("usage").filter(|u| u.is_object()) else {
            return Self {
                status,
                incomplete_reason,
                ..Default::default()
            };
        };

        let mut total = opt_u64(usage.get("total_tokens"));
        let mut input = opt_u64(usage.get("input_tokens"));
        let mut output = opt_u64(usage.get("output_tokens"));
        if total.is_none() {
            if let (Some(i), Some(o)) = (input, output) {
                total = Some(i.saturating_add(o));
            }
        }
        if total.is_none() {
            let prompt = opt_u64(usage.get("prompt_tokens"));
            let completion = opt_u64(usage.get("completion_tokens"));
            if let (Some(p), Some(c)) = (prompt, completion) {
                total = Some(p.saturating_add(c));
            }
            input = input.or(prompt);
            output = output.or(completion);
        }

        Self {
            total,
            input,
            output,
            cached_input: opt_u64(
                usage
                    .get("input_tokens_details")
                    .and_then(|d| d.get("cached_tokens")),
            ),
            reasoning_output: opt_u64(
                usage
                    .get("output_tokens_details")
                    .and_then(|d| d.get("reasoning_tokens")),
            ),
            status,
            incomplete_reason,
        }
    }

    /// Whether the response was cut off by the output-length limit.
    ///
    /// Only this kind of truncation is worth one continuation request.
    pub fn should_auto_continue(&self) -> bool {
        if self.status.as_deref() != Some("incomplete") {
            return false;
        }
        let reason = self
            .incomplete_reason
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if reason.is_empty() {
            return false;
        }
        reason == "max_output_tokens" || reason == "max_tokens" || reason.contains("max_output")
    }
}

fn opt_u64(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64)
}

fn opt_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Running usage totals for one logical turn.
///
/// Counters that no snapshot ever reported stay `None` so callers can tell
/// "zero" from "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageAccumulator {
    total: u64,
    input: Option<u64>,
    output: Option<u64>,
    cached_input: Option<u64>,
    reasoning_output: Option<u64>,
    calls: usize,
}

impl UsageAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one provider call's usage.
    pub fn add(&mut self, usage: &UsageSnapshot) {
        self.calls = self.calls.saturating_add(1);
        if let Some(total) = usage.total {
            self.total = self.total.saturating_add(total);
        }
        add_opt(&mut self.input, usage.input);
        add_opt(&mut self.output, usage.output);
        add_opt(&mut self.cached_input, usage.cached_input);
        add_opt(&mut self.reasoning_output, usage.reasoning_output);
    }

    /// Total tokens, or `None` when nothing was reported.
    pub fn total_tokens(&self) -> Option<u64> {
        (self.total > 0).then_some(self.total)
    }

    /// Total tokens, zero when nothing was reported.
    pub fn total_or_zero(&self) -> u64 {
        self.total
    }

    /// Summed input tokens.
    pub fn input_tokens(&self) -> Option<u64> {
        self.input
    }

    /// Summed output tokens.
    pub fn output_tokens(&self) -> Option<u64> {
        self.output
    }

    /// Summed cached input tokens.
    pub fn cached_input_tokens(&self) -> Option<u64> {
        self.cached_input
    }

    /// Summed reasoning output tokens.
    pub fn reasoning_output_tokens(&self) -> Option<u64> {
        self.reasoning_output
    }

    /// Number of snapshots added.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

fn add_opt(slot: &mut Option<u64>, value: Option<u64>) {
    if let Some(v) = value {
        *slot = Some(slot.unwrap_or(0).saturating_add(v));
    }
}
