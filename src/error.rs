//! Error types for Relaybot
//!
//! This module defines the error types used throughout the execution engine.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Two families live here:
//!
//! - [`RelayError`] / [`ProviderError`]: failures that abort a run and reach
//!   the caller (provider transport, timeouts, configuration).
//! - [`ToolError`] / [`ToolErrorKind`]: failures of a single tool call. These
//!   never abort a run; the executor folds them into a structured result that
//!   is fed back to the model.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Transport-level retry and backoff belong to the provider client. The
/// engine only inspects the classification to decide whether a request can
/// be repeated without its response schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 401: Invalid API key or authentication failure
    Auth(String),
    /// 429: Rate limit or quota exceeded
    RateLimit(String),
    /// 500/502/503/504: Server-side errors
    ServerError(String),
    /// 400: Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// The provider does not support the requested structured-output mode
    SchemaUnsupported(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::SchemaUnsupported(msg) => {
                write!(f, "Structured output not supported: {}", msg)
            }
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Returns `true` if this error is transient.
    ///
    /// Informational only: the engine never retries transport failures itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::ServerError(_) | ProviderError::Timeout(_)
        )
    }

    /// Returns `true` if the provider refused the request because of its
    /// response schema, meaning the same call may be repeated without one.
    pub fn rejects_response_schema(&self) -> bool {
        match self {
            ProviderError::SchemaUnsupported(_) => true,
            ProviderError::InvalidRequest(msg) => {
                let lowered = msg.to_lowercase();
                lowered.contains("json mode is not supported") || lowered.contains("\"code\":20024")
            }
            _ => false,
        }
    }
}

impl From<ProviderError> for RelayError {
    fn from(err: ProviderError) -> Self {
        RelayError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Relaybot operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors (invalid limits, unreadable prompt file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors (missing provider, malformed completion)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error propagated from the completion client.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool registry errors (duplicate or malformed bindings)
    #[error("Tool error: {0}")]
    Tool(String),

    /// The run exceeded its cooperative deadline.
    #[error("Run timed out after {seconds}s")]
    Timeout {
        /// The deadline that expired, in seconds.
        seconds: u64,
    },

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for Relaybot operations.
pub type Result<T> = std::result::Result<T, RelayError>;

// ============================================================================
// Tool Error Taxonomy
// ============================================================================

/// Error kinds reported back to the model in tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolErrorKind {
    /// Call arguments could not be parsed or repaired into an object.
    InvalidArguments,
    /// The handler failed, panicked, or the tool is not registered.
    ExecutionFailed,
    /// An upstream classifier returned a payload that failed validation.
    ClassifierInvalidPayload,
    /// An upstream planner selected an agent that does not exist.
    PlannerInvalidAgent,
}

impl ToolErrorKind {
    /// Stable wire code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ToolErrorKind::InvalidArguments => "invalid_tool_arguments",
            ToolErrorKind::ExecutionFailed => "tool_execution_failed",
            ToolErrorKind::ClassifierInvalidPayload => "classifier_invalid_payload",
            ToolErrorKind::PlannerInvalidAgent => "planner_invalid_agent",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure of a single tool invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ToolError {
    /// Classification sent back to the model as `error_code`.
    pub kind: ToolErrorKind,
    /// Human-readable description sent back to the model as `error`.
    pub message: String,
}

impl ToolError {
    /// Create a new tool error.
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Arguments were malformed.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidArguments, message)
    }

    /// The handler failed.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ExecutionFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Config("max_steps must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: max_steps must be at least 1"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RelayError = io_err.into();
        assert!(matches!(err, RelayError::Io(_)));
    }

    #[test]
    fn test_timeout_display() {
        let err = RelayError::Timeout { seconds: 60 };
        assert_eq!(err.to_string(), "Run timed out after 60s");
    }

    #[test]
    fn test_provider_error_is_retryable() {
        assert!(ProviderError::RateLimit("429".into()).is_retryable());
        assert!(ProviderError::ServerError("500".into()).is_retryable());
        assert!(ProviderError::Timeout("timeout".into()).is_retryable());

        assert!(!ProviderError::Auth("401".into()).is_retryable());
        assert!(!ProviderError::InvalidRequest("400".into()).is_retryable());
        assert!(!ProviderError::SchemaUnsupported("json".into()).is_retryable());
        assert!(!ProviderError::Unknown("???".into()).is_retryable());
    }

    #[test]
    fn test_rejects_response_schema() {
        assert!(ProviderError::SchemaUnsupported("nope".into()).rejects_response_schema());
        assert!(
            ProviderError::InvalidRequest("JSON mode is not supported for this model".into())
                .rejects_response_schema()
        );
        assert!(
            ProviderError::InvalidRequest(r#"{"error":{"code":20024,"message":"x"}}"#.into())
                .rejects_response_schema()
        );
        assert!(!ProviderError::InvalidRequest("bad json".into()).rejects_response_schema());
        assert!(!ProviderError::ServerError("json mode is not supported".into())
            .rejects_response_schema());
    }

    #[test]
    fn test_provider_error_into_relay_error() {
        let err: RelayError = ProviderError::RateLimit("too fast".into()).into();
        assert!(matches!(err, RelayError::ProviderTyped(_)));
        assert_eq!(err.to_string(), "Provider error: Rate limit error: too fast");
    }

    #[test]
    fn test_tool_error_kind_codes() {
        assert_eq!(ToolErrorKind::InvalidArguments.code(), "invalid_tool_arguments");
        assert_eq!(ToolErrorKind::ExecutionFailed.code(), "tool_execution_failed");
        assert_eq!(
            ToolErrorKind::ClassifierInvalidPayload.to_string(),
            "classifier_invalid_payload"
        );
        assert_eq!(ToolErrorKind::PlannerInvalidAgent.code(), "planner_invalid_agent");
    }

    #[test]
    fn test_tool_error_constructors() {
        let err = ToolError::invalid_arguments("missing brace");
        assert_eq!(err.kind, ToolErrorKind::InvalidArguments);
        assert_eq!(err.to_string(), "missing brace");

        let err = ToolError::execution_failed("boom");
        assert_eq!(err.kind, ToolErrorKind::ExecutionFailed);
    }
}
