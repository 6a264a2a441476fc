//! Log sanitization.
//!
//! Nothing written to logs may carry credentials or multi-megabyte inline
//! blobs. Tool arguments are masked by key before they reach a `debug!`
//! field, and previews of model output have `data:` URLs collapsed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Placeholder written in place of sensitive values.
pub const REDACTED: &str = "***";

/// Strings longer than this are cut in logs.
pub const MAX_LOG_STRING_CHARS: usize = 300;

/// Arrays and objects keep at most this many entries in logs.
pub const MAX_LOG_COLLECTION_ITEMS: usize = 20;

const SENSITIVE_KEY_PARTS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "secret",
    "password",
    "passwd",
    "authorization",
    "cookie",
];

static BASE64_URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"data:[a-zA-Z0-9/+\-\.]+;base64,[A-Za-z0-9+/=]+").unwrap());

/// Replace `data:...;base64,...` URIs with a short placeholder.
pub fn redact_data_urls(text: &str) -> String {
    BASE64_URI_RE
        .replace_all(text, |caps: &regex::Captures| {
            format!("[base64 data removed, {} bytes]", caps[0].len())
        })
        .into_owned()
}

/// Whether an argument key names a credential.
///
/// Matching is case-insensitive and treats `-` like `_`.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_lowercase().replace('-', "_");
    if normalized.is_empty() {
        return false;
    }
    SENSITIVE_KEY_PARTS
        .iter()
        .any(|part| normalized.contains(part))
}

/// Copy of tool arguments that is safe to log.
///
/// # Example
/// ```
/// use relaybot::utils::sanitize::sanitize_arguments_for_log;
/// use serde_json::json;
///
/// let args = json!({"query": "rust", "api_key": "sk-123"});
/// let safe = sanitize_arguments_for_log(args.as_object().unwrap());
/// assert_eq!(safe["api_key"], "***");
/// assert_eq!(safe["query"], "rust");
/// ```
pub fn sanitize_arguments_for_log(arguments: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for (key, value) in arguments {
        let sanitized = if is_sensitive_key(key) {
            Value::String(REDACTED.to_string())
        } else {
            sanitize_value(value)
        };
        out.insert(key.clone(), sanitized);
    }
    Value::Object(out)
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() <= MAX_LOG_STRING_CHARS {
                value.clone()
            } else {
                Value::String(format!(
                    "{}...",
                    super::string::prefix_chars(s, MAX_LOG_STRING_CHARS)
                ))
            }
        }
        Value::Array(items) => {
            let mut out: Vec<Value> = items
                .iter()
                .take(MAX_LOG_COLLECTION_ITEMS)
                .map(sanitize_value)
                .collect();
            if items.len() > MAX_LOG_COLLECTION_ITEMS {
                out.push(Value::String(format!(
                    "...(+{} items)",
                    items.len() - MAX_LOG_COLLECTION_ITEMS
                )));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, item) in map.iter().take(MAX_LOG_COLLECTION_ITEMS) {
                let sanitized = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    sanitize_value(item)
                };
                out.insert(key.clone(), sanitized);
            }
            if map.len() > MAX_LOG_COLLECTION_ITEMS {
                out.insert(
                    "...".to_string(),
                    Value::String(format!("+{} keys", map.len() - MAX_LOG_COLLECTION_ITEMS)),
                );
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_data_urls() {
        let input = "before data:image/png;base64,iVBORw0KGgoAAAA after";
        let out = redact_data_urls(input);
        assert!(out.starts_with("before [base64 data removed,"));
        assert!(out.ends_with(" after"));
        assert!(!out.contains("iVBOR"));
    }

    #[test]
    fn test_redact_leaves_plain_text() {
        assert_eq!(redact_data_urls("no blobs here"), "no blobs here");
    }

    #[test]
    fn test_sensitive_key_matching() {
        assert!(is_sensitive_key("api_key"));
        assert!(is_sensitive_key("X-Api-Key"));
        assert!(is_sensitive_key("refresh_token"));
        assert!(is_sensitive_key("Authorization"));
        assert!(is_sensitive_key("session-cookie"));
        assert!(!is_sensitive_key("path"));
        assert!(!is_sensitive_key(""));
    }

    #[test]
    fn test_nested_secrets_masked() {
        let args = json!({
            "headers": {"Authorization": "Bearer abc", "accept": "json"},
            "url": "https://example.com"
        });
        let safe = sanitize_arguments_for_log(args.as_object().unwrap());
        assert_eq!(safe["headers"]["Authorization"], "***");
        assert_eq!(safe["headers"]["accept"], "json");
        assert_eq!(safe["url"], "https://example.com");
    }

    #[test]
    fn test_long_string_truncated() {
        let long = "x".repeat(MAX_LOG_STRING_CHARS + 50);
        let args = json!({"body": long});
        let safe = sanitize_arguments_for_log(args.as_object().unwrap());
        let body = safe["body"].as_str().unwrap();
        assert_eq!(body.chars().count(), MAX_LOG_STRING_CHARS + 3);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn test_collections_capped_with_marker() {
        let items: Vec<i32> = (0..25).collect();
        let mut wide = Map::new();
        for i in 0..23 {
            wide.insert(format!("k{:02}", i), json!(i));
        }
        let args = json!({"items": items, "wide": wide});
        let safe = sanitize_arguments_for_log(args.as_object().unwrap());

        let list = safe["items"].as_array().unwrap();
        assert_eq!(list.len(), MAX_LOG_COLLECTION_ITEMS + 1);
        assert_eq!(list.last().unwrap(), "...(+5 items)");

        let obj = safe["wide"].as_object().unwrap();
        assert_eq!(obj.len(), MAX_LOG_COLLECTION_ITEMS + 1);
        assert_eq!(obj["..."], "+3 keys");
    }
}
