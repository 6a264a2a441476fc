//! Tool argument decoding
//!
//! Models do not always emit clean JSON for tool arguments. Decoding tries,
//! in order: the payload as given, the payload with a markdown fence
//! removed, and brace-repaired variants of both. Each candidate is parsed as
//! JSON first and then as a dict literal (JSON5 after mapping `True`,
//! `False` and `None`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::utils::string::preview;

static LEADING_JSON_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```json\s*").expect("valid fence regex"));
static LEADING_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```\s*").expect("valid fence regex"));
static TRAILING_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*```$").expect("valid fence regex"));

/// Characters of a rejected payload echoed back in the error message.
const ARGUMENT_PREVIEW_CHARS: usize = 220;

/// Remove a surrounding markdown code fence.
///
/// The opening fence and any language tag are dropped, as is a closing
/// fence whether it sits on its own line or right after the content. Text
/// without a leading fence is returned trimmed.
///
/// # Example
/// ```
/// use relaybot::tools::arguments::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_code_fences("```json {\"a\": 1}```"), "{\"a\": 1}");
/// assert_eq!(strip_code_fences("  plain  "), "plain");
/// ```
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
        .unwrap_or(rest.len());
    let body = rest.get(tag_len..).unwrap_or_default().trim();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

/// Parse JSON, retrying once with markdown fences stripped.
///
/// Returns the error from the second attempt when both fail.
pub fn parse_json_with_fenced_fallback(payload: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(payload) {
        Ok(value) => Ok(value),
        Err(_) => {
            let stripped = payload.trim();
            let stripped = LEADING_JSON_FENCE_RE.replace(stripped, "");
            let stripped = LEADING_FENCE_RE.replace(&stripped, "");
            let stripped = TRAILING_FENCE_RE.replace(&stripped, "");
            serde_json::from_str(&stripped)
        }
    }
}

/// Decode a tool-call argument string into an object.
///
/// Blank input decodes to an empty object. Anything that cannot be
/// recovered into a JSON object fails with `invalid_tool_arguments`.
///
/// # Example
/// ```
/// use relaybot::tools::arguments::decode_tool_arguments;
///
/// let args = decode_tool_arguments(r#"{"path": "/tmp/a.txt""#).unwrap();
/// assert_eq!(args["path"], "/tmp/a.txt");
///
/// let args = decode_tool_arguments("{'verbose': True, 'limit': None}").unwrap();
/// assert_eq!(args["verbose"], true);
/// assert!(args["limit"].is_null());
/// ```
pub fn decode_tool_arguments(payload: &str) -> Result<Map<String, Value>, ToolError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }

    let mut candidates = vec![payload.to_string()];
    if trimmed.starts_with("```") {
        let fenced = strip_code_fences(trimmed);
        if !fenced.is_empty() {
            candidates.push(fenced);
        }
    }

    let repaired: Vec<String> = candidates
        .iter()
        .filter_map(|candidate| repair_braces(candidate))
        .collect();
    candidates.extend(repaired);

    for candidate in &candidates {
        if let Some(map) = parse_object(candidate) {
            return Ok(map);
        }
    }

    let flattened = trimmed.replace('\n', " ");
    Err(ToolError::invalid_arguments(format!(
        "Tool call arguments must be a valid JSON object. Received arguments preview: {}",
        preview(&flattened, ARGUMENT_PREVIEW_CHARS)
    )))
}

/// Append the missing closing braces to an object that was cut short.
fn repair_braces(candidate: &str) -> Option<String> {
    let text = candidate.trim();
    if !text.starts_with('{') {
        return None;
    }
    let opened = text.matches('{').count();
    let closed = text.matches('}').count();
    if opened > closed {
        Some(format!("{}{}", text, "}".repeat(opened - closed)))
    } else {
        None
    }
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    let parsed = serde_json::from_str::<Value>(candidate)
        .ok()
        .or_else(|| json5::from_str::<Value>(&map_python_literals(candidate)).ok())?;
    match parsed {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Rewrite `True`, `False` and `None` tokens outside string literals.
fn map_python_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    let flush = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            _ => out.push_str(word),
        }
        word.clear();
    };

    for ch in text.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
            continue;
        }
        flush(&mut word, &mut out);
        if ch == '"' || ch == '\'' {
            quote = Some(ch);
        }
        out.push(ch);
    }
    flush(&mut word, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;
    use serde_json::json;

    #[test]
    fn test_decode_plain_json() {
        let args = decode_tool_arguments(r#"{"a": 1, "b": [1, 2]}"#).unwrap();
        assert_eq!(Value::Object(args), json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn test_decode_blank_is_empty_object() {
        assert!(decode_tool_arguments("   ").unwrap().is_empty());
    }

    #[test]
    fn test_decode_repairs_unterminated_object() {
        let args = decode_tool_arguments(r#"{"path": "/tmp/a.txt""#).unwrap();
        assert_eq!(Value::Object(args), json!({"path": "/tmp/a.txt"}));
    }

    #[test]
    fn test_decode_repairs_nested_object() {
        let args = decode_tool_arguments(r#"{"filter": {"kind": "pdf""#).unwrap();
        assert_eq!(Value::Object(args), json!({"filter": {"kind": "pdf"}}));
    }

    #[test]
    fn test_decode_fenced() {
        let args = decode_tool_arguments("```json\n{\"q\": \"rust\"}\n```").unwrap();
        assert_eq!(args["q"], "rust");
    }

    #[test]
    fn test_decode_fenced_and_truncated() {
        let args = decode_tool_arguments("```\n{\"q\": \"rust\"\n```").unwrap();
        assert_eq!(args["q"], "rust");
    }

    #[test]
    fn test_decode_dict_literal() {
        let args =
            decode_tool_arguments("{'name': 'None of them', 'ok': False, 'n': None,}").unwrap();
        assert_eq!(args["name"], "None of them");
        assert_eq!(args["ok"], false);
        assert!(args["n"].is_null());
    }

    #[test]
    fn test_decode_rejects_non_object() {
        let err = decode_tool_arguments("[1, 2, 3]").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
    }

    #[test]
    fn test_decode_rejects_garbage_with_preview() {
        let err = decode_tool_arguments("not json\nat all").unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
        assert!(err.message.contains("not json at all"));
    }

    #[test]
    fn test_strip_code_fences_without_closing() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_strip_code_fences_closing_on_content_line() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn test_parse_json_with_fenced_fallback() {
        let payload = json!({"answer": {"kind": "text", "content": "42"}, "list": [1, "two"]});
        let fenced = format!("```json\n{}\n```", payload);
        assert_eq!(parse_json_with_fenced_fallback(&fenced).unwrap(), payload);

        let upper = format!("```JSON {}```", payload);
        assert_eq!(parse_json_with_fenced_fallback(&upper).unwrap(), payload);

        assert_eq!(parse_json_with_fenced_fallback("\"plain\"").unwrap(), json!("plain"));
        assert!(parse_json_with_fenced_fallback("```\nnope\n```").is_err());
    }

    #[test]
    fn test_map_python_literals_respects_strings() {
        assert_eq!(
            map_python_literals(r#"{"a": "True \"None\"", 'b': True}"#),
            r#"{"a": "True \"None\"", 'b': true}"#
        );
        assert_eq!(map_python_literals("{'Nonesuch': 1}"), "{'Nonesuch': 1}");
    }
}
