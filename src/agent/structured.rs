//! Structured-output validation for final answers
//!
//! A single-state machine (`final_response`) with a bounded attempt
//! counter. Each candidate answer is fence-stripped, parsed as JSON and
//! checked against the assistant payload contract:
//!
//! ```text
//! {
//!   "answer": {"kind": "text" | "html" | "markdown", "content": "...", "meta": {...}?},
//!   "should_answer_to_user": true | false,
//!   "attachments": [...]?
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::tools::arguments::parse_json_with_fenced_fallback;

/// Name of the only validator state.
pub const FINAL_RESPONSE_STATE: &str = "final_response";

/// Content of the payload substituted when validation gives up.
pub const STRUCTURED_FALLBACK_CONTENT: &str =
    "I could not produce a valid structured response in this attempt. Please try again.";

const ANSWER_KINDS: &[&str] = &["text", "html", "markdown"];
const PAYLOAD_FIELDS: &[&str] = &["answer", "should_answer_to_user", "attachments"];
const ANSWER_FIELDS: &[&str] = &["kind", "content", "meta"];
const META_FIELDS: &[&str] = &["disable_link_preview"];

/// How the answer content should be rendered by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKind {
    Text,
    Html,
    Markdown,
}

/// Rendering hints for an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_link_preview: Option<bool>,
}

/// The user-facing answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantAnswer {
    pub kind: AnswerKind,
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: AnswerMeta,
}

/// The structured payload a final answer must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantPayload {
    pub answer: AssistantAnswer,
    pub should_answer_to_user: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<Map<String, Value>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Wrap plain text in the structured answer shape.
///
/// # Example
/// ```
/// use relaybot::agent::structured_text_payload;
///
/// let payload = structured_text_payload("done");
/// assert_eq!(payload["answer"]["kind"], "text");
/// assert_eq!(payload["should_answer_to_user"], true);
/// ```
pub fn structured_text_payload(content: &str) -> Value {
    json!({
        "answer": {"kind": "text", "content": content},
        "should_answer_to_user": true,
    })
}

/// A failed attempt kept in the validator history.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedAttempt {
    pub attempt: u32,
    pub reason: String,
    pub errors: Vec<String>,
}

/// Result of feeding one candidate to the validator.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationAction {
    /// The candidate matches; `payload` is the normalized JSON.
    Valid { payload: Value, attempts: u32 },
    /// The candidate is invalid and attempts remain.
    Retry {
        prompt_patch: Option<String>,
        attempts: u32,
        reason: String,
        errors: Vec<String>,
    },
    /// The candidate is invalid and the budget is spent.
    Fail {
        attempts: u32,
        reason: String,
        history: Vec<RejectedAttempt>,
    },
}

/// Bounded-retry validator for structured final answers.
#[derive(Debug, Clone)]
pub struct StructuredOutputValidator {
    max_attempts: u32,
    attempts: u32,
    history: Vec<RejectedAttempt>,
}

impl StructuredOutputValidator {
    /// Create a validator allowing `max_attempts` candidates (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: 0,
            history: Vec::new(),
        }
    }

    /// Name of the current state.
    pub fn state_name(&self) -> &'static str {
        FINAL_RESPONSE_STATE
    }

    /// Attempts consumed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Validate a raw candidate answer.
    ///
    /// # Example
    /// ```
    /// use relaybot::agent::{StructuredOutputValidator, ValidationAction};
    ///
    /// let mut validator = StructuredOutputValidator::new(3);
    /// let action = validator.receive(r#"{"answer":{"kind":"text","content":"42"},"should_answer_to_user":true}"#);
    /// assert!(matches!(action, ValidationAction::Valid { attempts: 1, .. }));
    /// ```
    pub fn receive(&mut self, raw: &str) -> ValidationAction {
        self.attempts += 1;
        let attempts = self.attempts;

        let (reason, errors) = match check_candidate(raw) {
            Ok(payload) => return ValidationAction::Valid { payload, attempts },
            Err(rejection) => rejection,
        };

        self.history.push(RejectedAttempt {
            attempt: attempts,
            reason: reason.clone(),
            errors: errors.clone(),
        });

        if attempts < self.max_attempts {
            let prompt_patch = Some(retry_prompt(&reason, &errors));
            ValidationAction::Retry {
                prompt_patch,
                attempts,
                reason,
                errors,
            }
        } else {
            ValidationAction::Fail {
                attempts,
                reason,
                history: self.history.clone(),
            }
        }
    }

    /// Payload to return when validation fails for good.
    pub fn fallback_payload() -> Value {
        structured_text_payload(STRUCTURED_FALLBACK_CONTENT)
    }
}

impl Default for StructuredOutputValidator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STRUCTURED_OUTPUT_MAX_ATTEMPTS)
    }
}

fn check_candidate(raw: &str) -> std::result::Result<Value, (String, Vec<String>)> {
    let value = parse_json_with_fenced_fallback(raw.trim()).map_err(|e| {
        (
            "response is not valid JSON".to_string(),
            vec![format!("parse error: {}", e)],
        )
    })?;

    let errors = contract_errors(&value);
    if !errors.is_empty() {
        return Err(("response does not match the required schema".to_string(), errors));
    }

    let payload: AssistantPayload = serde_json::from_value(value).map_err(|e| {
        (
            "response does not match the required schema".to_string(),
            vec![e.to_string()],
        )
    })?;
    serde_json::to_value(payload).map_err(|e| {
        (
            "response could not be normalized".to_string(),
            vec![e.to_string()],
        )
    })
}

/// Collect every contract violation so the model can fix them in one go.
fn contract_errors(value: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = value.as_object() else {
        errors.push("payload: must be a JSON object".to_string());
        return errors;
    };
    unexpected_fields(obj, PAYLOAD_FIELDS, "", &mut errors);

    match obj.get("answer") {
        None => errors.push("answer: field required".to_string()),
        Some(Value::Object(answer)) => {
            unexpected_fields(answer, ANSWER_FIELDS, "answer.", &mut errors);
            match answer.get("kind").and_then(Value::as_str) {
                Some(kind) if ANSWER_KINDS.contains(&kind) => {}
                Some(kind) => errors.push(format!(
                    "answer.kind: '{}' is not one of {}",
                    kind,
                    ANSWER_KINDS.join(", ")
                )),
                None => errors.push(format!(
                    "answer.kind: must be one of {}",
                    ANSWER_KINDS.join(", ")
                )),
            }
            match answer.get("content") {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(Value::String(_)) => {
                    errors.push("answer.content: must not be empty".to_string())
                }
                Some(_) => errors.push("answer.content: must be a string".to_string()),
                None => errors.push("answer.content: field required".to_string()),
            }
            match answer.get("meta") {
                None | Some(Value::Null) => {}
                Some(Value::Object(meta)) => {
                    unexpected_fields(meta, META_FIELDS, "answer.meta.", &mut errors);
                    if let Some(v) = meta.get("disable_link_preview") {
                        if !(v.is_boolean() || v.is_null()) {
                            errors.push(
                                "answer.meta.disable_link_preview: must be a boolean".to_string(),
                            );
                        }
                    }
                }
                Some(_) => errors.push("answer.meta: must be an object".to_string()),
            }
        }
        Some(_) => errors.push("answer: must be an object".to_string()),
    }

    match obj.get("should_answer_to_user") {
        Some(Value::Bool(_)) => {}
        Some(_) => errors.push("should_answer_to_user: must be a boolean".to_string()),
        None => errors.push("should_answer_to_user: field required".to_string()),
    }

    match obj.get("attachments") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if !item.is_object() {
                    errors.push(format!("attachments[{}]: must be an object", i));
                }
            }
        }
        Some(_) => errors.push("attachments: must be a list".to_string()),
    }

    errors
}

fn unexpected_fields(obj: &Map<String, Value>, known: &[&str], prefix: &str, errors: &mut Vec<String>) {
    for key in obj.keys() {
        if !known.contains(&key.as_str()) {
            errors.push(format!("{}{}: unexpected field", prefix, key));
        }
    }
}

fn retry_prompt(reason: &str, errors: &[String]) -> String {
    format!(
        "Your previous reply could not be used: {}. Problems: {}. \
         Reply again with only a JSON object of the form \
         {{\"answer\": {{\"kind\": \"text\", \"content\": \"...\"}}, \"should_answer_to_user\": true}}.",
        reason,
        errors.join("; ")
    )
}
