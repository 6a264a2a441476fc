//! Configuration type definitions for Relaybot
//!
//! This module defines all configuration structs used by the engine.
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};

use crate::providers::ApiMode;

/// Main configuration struct for Relaybot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Step loop budgets and tool trust policy
    pub runtime: RuntimeConfig,
    /// Model selection and request options
    pub llm: LlmConfig,
    /// Log output
    pub logging: LoggingConfig,
}

// ============================================================================
// Runtime Configuration
// ============================================================================

/// Default number of tool rounds per turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 8;
/// Default run deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Floor applied to the configured deadline.
pub const DEFAULT_MIN_TIMEOUT_SECS: u64 = 30;
/// Default structured-output attempt budget.
pub const DEFAULT_STRUCTURED_OUTPUT_MAX_ATTEMPTS: u32 = 3;

/// Step loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Tool rounds before the loop gives up
    pub max_tool_iterations: u32,
    /// Run deadline in seconds
    pub timeout_secs: u64,
    /// The deadline is never shorter than this
    pub min_timeout_secs: u64,
    /// Tools trusted to insert messages into the conversation
    pub allowed_append_message_tools: Vec<String>,
    /// Whether trusted tools may insert `system` messages
    pub allow_system_inserts: bool,
    /// Root directory for managed-file parts
    pub managed_files_root: Option<String>,
    /// Attempts the structured-output validator allows
    pub structured_output_max_attempts: u32,
    /// Execute independent tool calls of one step concurrently
    pub parallel_tool_calls: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_timeout_secs: DEFAULT_MIN_TIMEOUT_SECS,
            allowed_append_message_tools: Vec::new(),
            allow_system_inserts: false,
            managed_files_root: None,
            structured_output_max_attempts: DEFAULT_STRUCTURED_OUTPUT_MAX_ATTEMPTS,
            parallel_tool_calls: false,
        }
    }
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Relaybot, a helpful assistant.";

/// Model and request options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier passed to the provider
    pub model: String,
    /// Inline system prompt
    pub system_prompt: String,
    /// File whose contents replace `system_prompt`
    pub system_prompt_file: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap per request
    pub max_output_tokens: Option<u32>,
    /// Request family spoken by the provider
    pub api_mode: ApiMode,
    /// Send a prompt cache key when the caller supplies one
    pub prompt_cache_enabled: bool,
    /// Reasoning effort hint (`low`, `medium`, `high`)
    pub reasoning_effort: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            system_prompt_file: None,
            temperature: None,
            max_output_tokens: None,
            api_mode: ApiMode::ChatCompletions,
            prompt_cache_enabled: true,
            reasoning_effort: None,
        }
    }
}

impl LlmConfig {
    /// Cache key identifying a provider client built from this config.
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.model,
            self.api_mode,
            self.temperature
                .map(|t| t.to_string())
                .unwrap_or_default(),
            self.max_output_tokens
                .map(|t| t.to_string())
                .unwrap_or_default(),
            self.reasoning_effort.as_deref().unwrap_or(""),
        )
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    Pretty,
    /// Compact single-line output with component fields
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Append JSON logs to this file instead of stdout
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_defaults() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.max_tool_iterations, 8);
        assert_eq!(cfg.timeout_secs, 60);
        assert_eq!(cfg.min_timeout_secs, 30);
        assert!(cfg.allowed_append_message_tools.is_empty());
        assert!(!cfg.allow_system_inserts);
        assert_eq!(cfg.structured_output_max_attempts, 3);
        assert!(!cfg.parallel_tool_calls);
    }

    #[test]
    fn test_llm_defaults() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.api_mode, ApiMode::ChatCompletions);
        assert!(cfg.prompt_cache_enabled);
        assert_eq!(cfg.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_signature_changes_with_mode() {
        let a = LlmConfig::default();
        let b = LlmConfig {
            api_mode: ApiMode::Responses,
            ..LlmConfig::default()
        };
        assert_ne!(a.signature(), b.signature());
        assert_eq!(a.signature(), LlmConfig::default().signature());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"runtime":{"max_tool_iterations":3},"llm":{"api_mode":"responses"}}"#)
                .unwrap();
        assert_eq!(cfg.runtime.max_tool_iterations, 3);
        assert_eq!(cfg.runtime.timeout_secs, 60);
        assert_eq!(cfg.llm.api_mode, ApiMode::Responses);
        assert_eq!(cfg.logging.level, "info");
    }
}
