//! Relaybot - a bounded tool-calling execution engine for chat agents

pub mod agent;
pub mod config;
pub mod error;
pub mod providers;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{
    AgentRuntime, CompletionDriver, GenerateRequest, Generation, RunOptions, RuntimeLimits,
    RuntimeResult,
};
pub use config::Config;
pub use error::{ProviderError, RelayError, Result, ToolError, ToolErrorKind};
pub use providers::{CompletionProvider, CompletionRequest, CompletionStep, ProviderToolCall};
pub use session::{Directive, Message, Part, Role, State};
pub use tools::{Tool, ToolContext, ToolRegistry, ToolResult};
