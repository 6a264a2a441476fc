//! Provider types for Relaybot
//!
//! This module defines the narrow completion interface the engine drives
//! (`CompletionProvider`), the request it sends, and the step it gets back.
//! Wire formats of specific vendors stay behind the trait; the only shapes
//! this crate knows about are the two message families in [`RenderedMessage`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::ProviderError;
use crate::providers::usage::UsageSnapshot;
use crate::session::Role;

/// Request/response family spoken by a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApiMode {
    /// Stateless chat completions: full history every call.
    #[default]
    ChatCompletions,
    /// Stateful responses: follow-ups chain via `previous_response_id`.
    Responses,
}

impl ApiMode {
    /// Whether this is the stateful responses family.
    pub fn is_responses(&self) -> bool {
        matches!(self, ApiMode::Responses)
    }
}

impl std::fmt::Display for ApiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiMode::ChatCompletions => write!(f, "chat_completions"),
            ApiMode::Responses => write!(f, "responses"),
        }
    }
}

/// Definition of a tool that can be called by the LLM.
///
/// Tool definitions describe the available tools, their parameters,
/// and how the LLM should invoke them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use relaybot::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "current_datetime",
    ///     "Return the current date and time",
    ///     json!({"type": "object", "properties": {}}),
    /// );
    /// assert_eq!(tool.name, "current_datetime");
    /// ```
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Raw arguments attached to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolArguments {
    /// A JSON-encoded string, possibly malformed.
    Text(String),
    /// An already-decoded object.
    Object(Map<String, Value>),
}

impl Default for ToolArguments {
    fn default() -> Self {
        ToolArguments::Text(String::new())
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderToolCall {
    /// Correlation id chosen by the provider
    pub id: String,
    /// Name of the tool to execute; empty when the provider omitted it
    #[serde(default)]
    pub name: String,
    /// Arguments for the tool
    #[serde(default)]
    pub arguments: ToolArguments,
    /// Provider-specific input block (may carry its own `call_id`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Map<String, Value>>,
}

impl ProviderToolCall {
    /// Create a new tool call.
    ///
    /// # Example
    /// ```
    /// use relaybot::providers::{ProviderToolCall, ToolArguments};
    ///
    /// let call = ProviderToolCall::new("call_1", "search", ToolArguments::Text(r#"{"q":"rust"}"#.into()));
    /// assert_eq!(call.name, "search");
    /// ```
    pub fn new(id: &str, name: &str, arguments: ToolArguments) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
            input: None,
        }
    }

    /// Attach a provider input block.
    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = Some(input);
        self
    }

    /// JSON form stored in message metadata.
    pub fn to_json(&self) -> Value {
        let arguments = match &self.arguments {
            ToolArguments::Text(text) => Value::String(text.clone()),
            ToolArguments::Object(map) => Value::Object(map.clone()),
        };
        let mut value = json!({
            "id": self.id,
            "name": self.name,
            "arguments": arguments,
        });
        if let (Some(input), Value::Object(obj)) = (&self.input, &mut value) {
            obj.insert("input".to_string(), Value::Object(input.clone()));
        }
        value
    }

    /// Decode the metadata form produced by [`ProviderToolCall::to_json`].
    pub fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Chat-completions wire form (`type=function`).
    pub fn to_wire(&self) -> Value {
        let arguments = match &self.arguments {
            ToolArguments::Text(text) => text.clone(),
            ToolArguments::Object(map) => Value::Object(map.clone()).to_string(),
        };
        json!({
            "id": self.id,
            "type": "function",
            "function": {"name": self.name, "arguments": arguments},
        })
    }
}

/// The assistant message returned by one provider round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMessage {
    /// Text content (may be empty when only tool calls were returned)
    pub content: String,
    /// Requested tool calls
    pub tool_calls: Vec<ProviderToolCall>,
}

/// Result of one provider round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionStep {
    /// The assistant message
    pub message: ProviderMessage,
    /// Opaque id for chaining follow-ups
    pub response_id: Option<String>,
    /// Token usage and completion status
    pub usage: UsageSnapshot,
}

impl CompletionStep {
    /// A plain text step with no tool calls.
    ///
    /// # Example
    /// ```
    /// use relaybot::providers::CompletionStep;
    ///
    /// let step = CompletionStep::text("Hello, world!");
    /// assert_eq!(step.message.content, "Hello, world!");
    /// assert!(!step.has_tool_calls());
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            message: ProviderMessage {
                content: content.to_string(),
                tool_calls: Vec::new(),
            },
            ..Default::default()
        }
    }

    /// A step requesting tool calls.
    pub fn tool_calls(content: &str, tool_calls: Vec<ProviderToolCall>) -> Self {
        Self {
            message: ProviderMessage {
                content: content.to_string(),
                tool_calls,
            },
            ..Default::default()
        }
    }

    /// Set usage information for this step.
    pub fn with_usage(mut self, usage: UsageSnapshot) -> Self {
        self.usage = usage;
        self
    }

    /// Set the response id.
    pub fn with_response_id(mut self, response_id: &str) -> Self {
        self.response_id = Some(response_id.to_string());
        self
    }

    /// Check if this step contains any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.message.tool_calls.is_empty()
    }

    /// Total tokens reported for this step, if any.
    pub fn total_tokens(&self) -> Option<u64> {
        self.usage.total
    }
}

/// One content part of a rendered, provider-shaped message.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Chat-completions text
    Text { text: String },
    /// Responses text
    InputText { text: String },
    /// Inline JSON value
    Json { value: Value },
    /// Chat-completions image
    ImageUrl { image_url: ImageUrl },
    /// Chat-completions file
    File { file: FileData },
    /// Responses image
    InputImage { image_url: String },
    /// Responses file
    InputFile { filename: String, file_data: String },
}

/// Wrapper for chat-completions image URLs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageUrl {
    /// A `data:` URL
    pub url: String,
}

/// Wrapper for chat-completions inline files.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileData {
    /// Name shown to the model
    pub filename: String,
    /// A `data:` URL
    pub file_data: String,
}

/// Content of a rendered non-tool message.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedContent {
    /// A bare string (single text part)
    Text(String),
    /// A list of typed parts
    Parts(Vec<ContentPart>),
    /// Provider-native content passed through verbatim
    Raw(Value),
}

impl RenderedContent {
    fn to_json(&self) -> Value {
        match self {
            RenderedContent::Text(text) => Value::String(text.clone()),
            RenderedContent::Parts(parts) => {
                Value::Array(parts.iter().map(|p| json!(p)).collect())
            }
            RenderedContent::Raw(raw) => raw.clone(),
        }
    }
}

/// A message in the provider's request shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedMessage {
    /// A conversational message (user, assistant, or system)
    Message {
        role: Role,
        content: RenderedContent,
        tool_calls: Vec<ProviderToolCall>,
    },
    /// Chat-completions tool result
    ToolResult {
        name: String,
        tool_call_id: String,
        content: String,
    },
    /// Responses tool result
    FunctionCallOutput { call_id: String, output: String },
}

impl RenderedMessage {
    /// Shorthand for a plain text message.
    pub fn text(role: Role, text: &str) -> Self {
        RenderedMessage::Message {
            role,
            content: RenderedContent::Text(text.to_string()),
            tool_calls: Vec::new(),
        }
    }

    /// Role of this message on the wire.
    pub fn role(&self) -> Option<Role> {
        match self {
            RenderedMessage::Message { role, .. } => Some(*role),
            RenderedMessage::ToolResult { .. } => Some(Role::Tool),
            RenderedMessage::FunctionCallOutput { .. } => None,
        }
    }

    /// Provider JSON for this message.
    pub fn to_json(&self) -> Value {
        match self {
            RenderedMessage::Message {
                role,
                content,
                tool_calls,
            } => {
                let mut value = json!({"role": role.as_str(), "content": content.to_json()});
                if !tool_calls.is_empty() {
                    if let Value::Object(obj) = &mut value {
                        obj.insert(
                            "tool_calls".to_string(),
                            Value::Array(tool_calls.iter().map(ProviderToolCall::to_wire).collect()),
                        );
                    }
                }
                value
            }
            RenderedMessage::ToolResult {
                name,
                tool_call_id,
                content,
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "name": name,
                "content": content,
            }),
            RenderedMessage::FunctionCallOutput { call_id, output } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }),
        }
    }

    /// The textual payload of a tool result, if this is one.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            RenderedMessage::ToolResult { content, .. } => Some(content),
            RenderedMessage::FunctionCallOutput { output, .. } => Some(output),
            RenderedMessage::Message { .. } => None,
        }
    }
}

impl Serialize for RenderedMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// One request to the completion provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    /// Rendered conversation (or only follow-up items in responses mode)
    pub messages: Vec<RenderedMessage>,
    /// Top-level system instructions
    pub instructions: Option<String>,
    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,
    /// JSON schema the final answer must follow
    pub response_schema: Option<Value>,
    /// Provider prompt-cache routing key
    pub prompt_cache_key: Option<String>,
    /// Chain from a prior response (responses mode)
    pub previous_response_id: Option<String>,
    /// Output token cap
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Reasoning effort hint
    pub reasoning_effort: Option<String>,
}

impl CompletionRequest {
    /// Create a request over the given messages.
    pub fn new(messages: Vec<RenderedMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Set the top-level instructions.
    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Set the tool list.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the response schema.
    pub fn with_response_schema(mut self, schema: Option<Value>) -> Self {
        self.response_schema = schema;
        self
    }

    /// Set the prompt cache key.
    pub fn with_prompt_cache_key(mut self, key: Option<String>) -> Self {
        self.prompt_cache_key = key;
        self
    }

    /// Set the previous response id.
    pub fn with_previous_response_id(mut self, id: Option<String>) -> Self {
        self.previous_response_id = id;
        self
    }
}

/// The completion interface consumed by the engine.
///
/// Implementations own transport, authentication, retry, and the mapping
/// of [`CompletionRequest`] onto a vendor API. The engine only ever asks for
/// one completion at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Issue exactly one completion request.
    async fn complete_once(&self, request: &CompletionRequest)
        -> Result<CompletionStep, ProviderError>;

    /// Which request family this provider speaks.
    fn api_mode(&self) -> ApiMode {
        ApiMode::ChatCompletions
    }

    /// Get the provider name (e.g., "openai", "openrouter").
    fn name(&self) -> &str;
}
