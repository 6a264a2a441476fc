//! Tools module - Tool bindings and execution for LLM function calling
//!
//! This module provides the infrastructure for binding tools and executing
//! the tool calls a model requests. Tool implementations themselves live
//! with the caller; the engine only needs their descriptors and handlers.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `FnTool`: A tool built from an async closure
//! - `ToolContext`: Read-only request identity shared by every call in a run
//! - `ToolRegistry`: The active tool set, keyed by name
//! - `executor`: Argument decoding, invocation, and provider payloads
//!
//! # Example
//!
//! ```rust
//! use relaybot::error::ToolError;
//! use relaybot::providers::{ApiMode, ProviderToolCall, ToolArguments};
//! use relaybot::tools::{execute_for_runtime, ExecutionOptions, FnTool, ToolContext, ToolRegistry, ToolResult};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(FnTool::new(
//!     "echo",
//!     "Echo the message back",
//!     json!({"type": "object", "properties": {"message": {"type": "string"}}}),
//!     |args, _ctx| async move { Ok::<_, ToolError>(ToolResult::new(args["message"].clone())) },
//! ));
//!
//! let calls = vec![ProviderToolCall::new(
//!     "call_1",
//!     "echo",
//!     ToolArguments::Text(r#"{"message": "Hello!"}"#.into()),
//! )];
//! let records = execute_for_runtime(
//!     &calls,
//!     &registry,
//!     &ToolContext::new(),
//!     ExecutionOptions::new(ApiMode::ChatCompletions),
//! )
//! .await;
//! assert_eq!(records[0].payload.tool_output(), Some("Hello!"));
//! # });
//! ```

pub mod arguments;
pub mod executor;
mod registry;
mod types;

pub use executor::{execute_for_runtime, stringify_result, ExecutionOptions, ExecutionRecord};
pub use registry::ToolRegistry;
pub use types::{FnTool, Tool, ToolBinding, ToolContext, ToolOutcome, ToolResult};
