//! Conversation types for Relaybot
//!
//! This module defines the message model driven by the runtime: roles,
//! typed content parts, the per-run [`State`], and the [`Directive`]s that
//! tools return to request side effects on that state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::providers::ProviderToolCall;

/// Metadata key under which assistant tool calls are stored.
pub const TOOL_CALLS_METADATA_KEY: &str = "tool_calls";

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the AI assistant
    Assistant,
    /// Results from tool executions
    Tool,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the bytes of an image or file part come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileSource {
    /// A file relative to the configured managed-files root.
    ///
    /// The path must be relative and must not escape the root. Unsafe or
    /// missing paths are dropped at render time.
    ManagedFile {
        /// Relative path inside the managed root.
        path: String,
    },
}

impl FileSource {
    /// Shorthand for a managed-file source.
    pub fn managed(path: impl Into<String>) -> Self {
        FileSource::ManagedFile { path: path.into() }
    }
}

/// A typed content part of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// An image resolved from a managed file.
    Image {
        /// Where to read the image from.
        source: FileSource,
        /// MIME type used for the data URL.
        mime: String,
    },
    /// A non-image file resolved from a managed file.
    File {
        /// Where to read the file from.
        source: FileSource,
        /// MIME type used for the data URL.
        mime: String,
        /// Display name sent to the provider; defaults to the file name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    /// Arbitrary JSON.
    Json {
        /// The JSON payload.
        value: Value,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Create a JSON part.
    pub fn json(value: Value) -> Self {
        Part::Json { value }
    }

    /// Create an image part backed by a managed file.
    pub fn image(path: impl Into<String>, mime: impl Into<String>) -> Self {
        Part::Image {
            source: FileSource::managed(path),
            mime: mime.into(),
        }
    }

    /// Create a file part backed by a managed file.
    pub fn file(path: impl Into<String>, mime: impl Into<String>) -> Self {
        Part::File {
            source: FileSource::managed(path),
            mime: mime.into(),
            filename: None,
        }
    }
}

/// A single message in a conversation.
///
/// Messages are owned by the run's [`State`] and are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// Ordered content parts
    #[serde(default)]
    pub content: Vec<Part>,
    /// Tool name, for tool result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ID of the tool call this message is responding to (for tool results)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Provider-native content sent verbatim instead of rendered parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<Value>,
    /// Free-form annotations (tool calls, synthetic markers)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// Create a message with the given role and parts.
    pub fn new(role: Role, content: Vec<Part>) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_call_id: None,
            raw_content: None,
            metadata: Map::new(),
        }
    }

    /// Create a new user message with a single text part.
    ///
    /// # Example
    /// ```
    /// use relaybot::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// assert_eq!(msg.text(), "Hello, assistant!");
    /// ```
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, vec![Part::text(content)])
    }

    /// Create a new assistant message with a single text part.
    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, vec![Part::text(content)])
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self::new(Role::System, vec![Part::text(content)])
    }

    /// Create a tool result message correlated to `tool_call_id`.
    ///
    /// # Example
    /// ```
    /// use relaybot::session::{Message, Role};
    ///
    /// let msg = Message::tool_result("call_123", "current_datetime", "2026-01-01T00:00:00Z");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    /// ```
    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        let mut msg = Self::new(Role::Tool, vec![Part::text(content)]);
        msg.name = Some(name.to_string());
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg
    }

    /// Create a tool result message holding a JSON value.
    pub fn tool_json(tool_call_id: &str, name: &str, value: Value) -> Self {
        let mut msg = Self::new(Role::Tool, vec![Part::json(value)]);
        msg.name = Some(name.to_string());
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg
    }

    /// Create an assistant message carrying tool calls in its metadata.
    pub fn assistant_with_tool_calls(content: &str, tool_calls: &[ProviderToolCall]) -> Self {
        let mut msg = Self::assistant(content);
        let calls: Vec<Value> = tool_calls.iter().map(ProviderToolCall::to_json).collect();
        msg.metadata
            .insert(TOOL_CALLS_METADATA_KEY.to_string(), Value::Array(calls));
        msg
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Attach provider-native content.
    pub fn with_raw_content(mut self, raw: Value) -> Self {
        self.raw_content = Some(raw);
        self
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool calls stored on this message, if any.
    ///
    /// Entries that no longer decode are skipped.
    pub fn tool_calls(&self) -> Vec<ProviderToolCall> {
        match self.metadata.get(TOOL_CALLS_METADATA_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(ProviderToolCall::from_json)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Check if this message has tool calls.
    pub fn has_tool_calls(&self) -> bool {
        matches!(
            self.metadata.get(TOOL_CALLS_METADATA_KEY),
            Some(Value::Array(items)) if !items.is_empty()
        )
    }

    /// Whether the runtime inserted this message on behalf of a tool.
    pub fn is_synthetic(&self) -> bool {
        self.metadata
            .get("synthetic")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Conversation state for a single run.
///
/// Only the runtime writes to it. Tools request changes through
/// [`Directive`]s instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct State {
    /// Ordered messages.
    pub messages: Vec<Message>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state from existing messages.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The last message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// A side effect requested by a tool and applied by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    /// Insert a synthetic message into the conversation.
    AppendMessage {
        /// The message to insert.
        message: Message,
    },
}
