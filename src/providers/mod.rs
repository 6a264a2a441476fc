//! Providers module - the completion interface the engine drives
//!
//! This module defines the `CompletionProvider` trait and the request,
//! step, and usage types shared by the runtime and the completion driver.
//! Concrete network clients live outside this crate and implement the trait.
//!
//! # Example
//!
//! ```
//! use relaybot::providers::{CompletionProvider, CompletionRequest, CompletionStep, ScriptedProvider};
//!
//! # tokio_test::block_on(async {
//! let provider = ScriptedProvider::new().then_step(CompletionStep::text("Hello!"));
//! let step = provider.complete_once(&CompletionRequest::default()).await.unwrap();
//! println!("Response: {}", step.message.content);
//! # });
//! ```

pub mod cache;
pub mod scripted;
mod types;
pub mod usage;

use crate::error::ProviderError;

pub use cache::ProviderCache;
pub use scripted::ScriptedProvider;
#[cfg(test)]
pub use types::MockCompletionProvider;
pub use types::{
    ApiMode, CompletionProvider, CompletionRequest, CompletionStep, ContentPart, FileData,
    ImageUrl, ProviderMessage, ProviderToolCall, RenderedContent, RenderedMessage,
    ToolArguments, ToolDefinition,
};
pub use usage::{UsageAccumulator, UsageSnapshot};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
///
/// Provider clients use this so the engine sees consistent classifications,
/// in particular for requests refused because of their response schema.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 | 422 => ProviderError::InvalidRequest(body.to_string()),
        408 | 504 => ProviderError::Timeout(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_error_auth() {
        assert!(matches!(
            parse_provider_error(401, "bad key"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            parse_provider_error(403, "forbidden"),
            ProviderError::Auth(_)
        ));
    }

    #[test]
    fn test_parse_provider_error_schema_rejection() {
        let err = parse_provider_error(400, r#"{"error":{"code":20024,"message":"json mode"}}"#);
        assert!(err.rejects_response_schema());
        let err = parse_provider_error(400, "missing field");
        assert!(!err.rejects_response_schema());
    }

    #[test]
    fn test_parse_provider_error_server_and_timeout() {
        assert!(matches!(
            parse_provider_error(503, "overloaded"),
            ProviderError::ServerError(_)
        ));
        assert!(matches!(
            parse_provider_error(504, "gateway"),
            ProviderError::Timeout(_)
        ));
        assert!(matches!(
            parse_provider_error(429, "slow"),
            ProviderError::RateLimit(_)
        ));
    }

    #[test]
    fn test_parse_provider_error_unknown() {
        let err = parse_provider_error(418, "teapot");
        assert_eq!(err, ProviderError::Unknown("HTTP 418: teapot".into()));
    }
}
