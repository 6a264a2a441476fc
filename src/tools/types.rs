//! Tool types for Relaybot
//!
//! This module defines the core types for tool execution: the `Tool` trait
//! that all tools implement, the read-only `ToolContext` shared across a run,
//! the `ToolResult` a handler returns, and `ToolBinding`, which pairs a
//! tool's descriptor with its handler.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::providers::ToolDefinition;
use crate::session::{Directive, Message};

/// Outcome of one handler invocation.
pub type ToolOutcome = std::result::Result<ToolResult, ToolError>;

/// Data returned by a tool handler.
///
/// Tools never touch conversation state directly. Side effects they want
/// applied travel back as [`Directive`]s and are subject to the runtime's
/// trust policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// JSON-serializable content fed back to the model
    pub content: Value,
    /// Requested side effects, in order
    pub directives: Vec<Directive>,
}

impl ToolResult {
    /// Result with the given content and no directives.
    pub fn new(content: Value) -> Self {
        Self {
            content,
            directives: Vec::new(),
        }
    }

    /// Plain text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(Value::String(content.into()))
    }

    /// Request that `message` be appended to the conversation.
    pub fn with_append_message(mut self, message: Message) -> Self {
        self.directives.push(Directive::AppendMessage { message });
        self
    }
}

/// Trait that all tools must implement.
///
/// Tools are executable functions that the LLM can call to perform actions
/// like reading files, fetching URLs, or doing arithmetic.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Map, Value};
/// use relaybot::error::ToolError;
/// use relaybot::tools::{Tool, ToolContext, ToolResult};
///
/// struct EchoTool;
///
/// #[async_trait]
/// impl Tool for EchoTool {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Echo the message back" }
///     fn parameters(&self) -> Value {
///         json!({
///             "type": "object",
///             "properties": {"message": {"type": "string"}},
///             "required": ["message"]
///         })
///     }
///     async fn execute(&self, args: Map<String, Value>, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
///         let message = args
///             .get("message")
///             .and_then(Value::as_str)
///             .ok_or_else(|| ToolError::invalid_arguments("message is required"))?;
///         Ok(ToolResult::text(message))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    ///
    /// This name is used to identify the tool when the LLM requests it.
    /// It should be unique within a registry.
    fn name(&self) -> &str;

    /// Get the tool description sent to the LLM.
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with decoded arguments.
    ///
    /// Errors are reported back to the model as structured tool results;
    /// they never abort the run.
    async fn execute(&self, args: Map<String, Value>, ctx: &ToolContext) -> ToolOutcome;
}

/// Request identity visible to tools.
///
/// Shared by reference across every tool call in a run and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolContext {
    /// Who owns the data the tools act on (tenant, account)
    pub owner_id: Option<String>,
    /// The channel name (e.g., "telegram", "console")
    pub channel: Option<String>,
    /// The chat/conversation ID within the channel
    pub chat_id: Option<String>,
    /// The end user who sent the message
    pub user_id: Option<String>,
}

impl ToolContext {
    /// Create a new empty tool context.
    ///
    /// # Example
    /// ```
    /// use relaybot::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new();
    /// assert!(ctx.channel.is_none());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.owner_id = Some(owner_id.to_string());
        self
    }

    /// Set the channel and chat ID.
    ///
    /// # Example
    /// ```
    /// use relaybot::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new()
    ///     .with_channel("telegram", "123456");
    /// assert_eq!(ctx.channel.as_deref(), Some("telegram"));
    /// assert_eq!(ctx.chat_id.as_deref(), Some("123456"));
    /// ```
    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    /// Set the user.
    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }
}

/// A tool's declared schema paired with its executable handler.
#[derive(Clone)]
pub struct ToolBinding {
    /// Descriptor sent to the provider
    pub definition: ToolDefinition,
    /// Handler invoked for matching calls
    pub tool: Arc<dyn Tool>,
}

impl ToolBinding {
    /// Bind a tool, taking its descriptor from the trait methods.
    pub fn new(tool: impl Tool + 'static) -> Self {
        Self::from_arc(Arc::new(tool))
    }

    /// Bind an already shared tool.
    pub fn from_arc(tool: Arc<dyn Tool>) -> Self {
        let definition = ToolDefinition::new(tool.name(), tool.description(), tool.parameters());
        Self { definition, tool }
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl std::fmt::Debug for ToolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBinding")
            .field("name", &self.definition.name)
            .finish()
    }
}

type HandlerFn = dyn Fn(Map<String, Value>, ToolContext) -> BoxFuture<'static, ToolOutcome>
    + Send
    + Sync;

/// A tool backed by an async closure.
///
/// # Example
/// ```
/// use relaybot::error::ToolError;
/// use relaybot::tools::{FnTool, ToolRegistry, ToolResult};
/// use serde_json::json;
///
/// let mut registry = ToolRegistry::new();
/// registry.register(FnTool::new(
///     "current_datetime",
///     "Return the current UTC time",
///     json!({"type": "object", "properties": {}}),
///     |_args, _ctx| async { Ok::<_, ToolError>(ToolResult::text("2026-01-01T00:00:00Z")) },
/// ));
/// assert!(registry.has("current_datetime"));
/// ```
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Arc<HandlerFn>,
}

impl FnTool {
    /// Create a tool from a name, schema, and async handler.
    pub fn new<F, Fut>(name: &str, description: &str, parameters: Value, handler: F) -> Self
    where
        F: Fn(Map<String, Value>, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutcome> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            handler: Arc::new(move |args, ctx| handler(args, ctx).boxed()),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn execute(&self, args: Map<String, Value>, ctx: &ToolContext) -> ToolOutcome {
        (self.handler)(args, ctx.clone()).await
    }
}
