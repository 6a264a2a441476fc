//! Agent module - the tool-calling execution engine
//!
//! Two loops share the same building blocks:
//!
//! - [`AgentRuntime`] drives a step loop over an explicit [`State`](crate::session::State),
//!   applying tool directives and validating structured answers.
//! - [`CompletionDriver`] runs a whole turn from a plain history, with usage
//!   accounting, one auto-continuation and a repeated-iteration guard.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐     ┌────────────────────┐
//! │    State     │────>│  AgentRuntime   │────>│ CompletionProvider │
//! │  (messages)  │     │  (step loop)    │     │   (external)       │
//! └──────────────┘     └─────────────────┘     └────────────────────┘
//!                        │      │      │
//!                        ▼      ▼      ▼
//!              MessageRenderer  │  StructuredOutputValidator
//!                               ▼
//!                     tools::execute_for_runtime
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use relaybot::agent::{AgentRuntime, RunOptions, RuntimeLimits};
//! use relaybot::providers::{CompletionStep, ScriptedProvider};
//! use relaybot::session::{Message, State};
//! use relaybot::tools::{ToolContext, ToolRegistry};
//!
//! # tokio_test::block_on(async {
//! let provider = Arc::new(ScriptedProvider::new().then_step(CompletionStep::text("done")));
//! let runtime = AgentRuntime::new(provider, ToolRegistry::new())
//!     .with_limits(RuntimeLimits::new(4, 8, 30).unwrap());
//!
//! let state = State::with_messages(vec![Message::user("do the thing")]);
//! let result = runtime.run(state, &ToolContext::new(), RunOptions::new()).await.unwrap();
//! assert_eq!(result.payload, "done");
//! # });
//! ```

pub mod driver;
pub mod limits;
pub mod loop_guard;
pub mod render;
pub mod runtime;
pub mod structured;

pub use driver::{CompletionDriver, GenerateRequest, Generation, HistoryEntry, CONTINUATION_PROMPT};
pub use limits::RuntimeLimits;
pub use loop_guard::{ToolLoopGuard, MAX_REPEATED_TOOL_ITERATIONS};
pub use render::MessageRenderer;
pub use runtime::{
    AgentRuntime, RunOptions, RuntimeResult, MAX_STEPS_FALLBACK_TEXT, MAX_TOOL_CALLS_FALLBACK_TEXT,
};
pub use structured::{
    structured_text_payload, AssistantPayload, StructuredOutputValidator, ValidationAction,
    STRUCTURED_FALLBACK_CONTENT,
};
