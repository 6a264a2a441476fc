//! Agent runtime implementation
//!
//! This module provides the step loop that drives one run: render the
//! state, request one completion, then either finish with a (validated)
//! answer or execute the requested tools and go around again. Every run is
//! bounded by [`RuntimeLimits`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::providers::{
    CompletionProvider, CompletionRequest, RenderedMessage, ToolDefinition, UsageAccumulator,
};
use crate::session::{Directive, Message, Part, Role, State};
use crate::tools::{execute_for_runtime, ExecutionOptions, ExecutionRecord, ToolContext, ToolRegistry};
use crate::utils::string::{humanize_token_count, log_preview};

use super::limits::RuntimeLimits;
use super::render::MessageRenderer;
use super::structured::{structured_text_payload, StructuredOutputValidator, ValidationAction};

/// Answer returned when the step budget runs out.
pub const MAX_STEPS_FALLBACK_TEXT: &str = "I reached the maximum execution steps before finishing.";
/// Answer returned when the tool-call budget runs out.
pub const MAX_TOOL_CALLS_FALLBACK_TEXT: &str =
    "I reached the maximum number of tool calls before finishing.";

/// Per-run request options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// JSON schema the final answer must follow
    pub response_schema: Option<Value>,
    /// Provider prompt-cache routing key
    pub prompt_cache_key: Option<String>,
    /// Response to chain the first request from
    pub previous_response_id: Option<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a structured final answer.
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_prompt_cache_key(mut self, key: &str) -> Self {
        self.prompt_cache_key = Some(key.to_string());
        self
    }

    pub fn with_previous_response_id(mut self, id: &str) -> Self {
        self.previous_response_id = Some(id.to_string());
        self
    }
}

/// Outcome of one [`AgentRuntime::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeResult {
    /// Final answer: a string, or the structured payload when a schema was given
    pub payload: Value,
    /// Id of the last provider response
    pub response_id: Option<String>,
    /// The conversation after the run
    pub state: State,
    /// Tokens used by every provider call in the run
    pub total_tokens: u64,
}

/// Drives the provider/tool step loop for one conversation.
///
/// The runtime owns nothing global: the provider and the tool set are
/// injected by the caller, and each [`run`](Self::run) works on the state it
/// is handed.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use relaybot::agent::{AgentRuntime, RunOptions};
/// use relaybot::providers::{CompletionStep, ScriptedProvider};
/// use relaybot::session::{Message, State};
/// use relaybot::tools::{ToolContext, ToolRegistry};
///
/// # tokio_test::block_on(async {
/// let provider = Arc::new(ScriptedProvider::new().then_step(CompletionStep::text("Hi there")));
/// let runtime = AgentRuntime::new(provider, ToolRegistry::new());
///
/// let state = State::with_messages(vec![Message::user("Hello")]);
/// let result = runtime.run(state, &ToolContext::new(), RunOptions::new()).await.unwrap();
/// assert_eq!(result.payload, "Hi there");
/// assert_eq!(result.state.len(), 2);
/// # });
/// ```
pub struct AgentRuntime {
    provider: Arc<dyn CompletionProvider>,
    registry: ToolRegistry,
    limits: RuntimeLimits,
    allowed_append_message_tools: HashSet<String>,
    allow_system_inserts: bool,
    managed_files_root: Option<PathBuf>,
    structured_output_max_attempts: u32,
    parallel_tool_calls: bool,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    reasoning_effort: Option<String>,
}

impl AgentRuntime {
    /// Create a runtime with default limits and no directive permissions.
    pub fn new(provider: Arc<dyn CompletionProvider>, registry: ToolRegistry) -> Self {
        Self {
            provider,
            registry,
            limits: RuntimeLimits::default(),
            allowed_append_message_tools: HashSet::new(),
            allow_system_inserts: false,
            managed_files_root: None,
            structured_output_max_attempts: crate::config::DEFAULT_STRUCTURED_OUTPUT_MAX_ATTEMPTS,
            parallel_tool_calls: false,
            max_output_tokens: None,
            temperature: None,
            reasoning_effort: None,
        }
    }

    /// Create a runtime configured from `config`.
    pub fn from_config(
        provider: Arc<dyn CompletionProvider>,
        registry: ToolRegistry,
        config: &Config,
    ) -> Result<Self> {
        let runtime = &config.runtime;
        let mut agent = Self::new(provider, registry)
            .with_limits(RuntimeLimits::from_config(runtime)?)
            .with_allowed_append_message_tools(runtime.allowed_append_message_tools.iter().cloned())
            .with_system_inserts(runtime.allow_system_inserts)
            .with_managed_files_root(config.managed_files_root())
            .with_structured_output_max_attempts(runtime.structured_output_max_attempts)
            .with_parallel_tool_calls(runtime.parallel_tool_calls);
        agent.max_output_tokens = config.llm.max_output_tokens;
        agent.temperature = config.llm.temperature;
        agent.reasoning_effort = config.llm.reasoning_effort.clone();
        Ok(agent)
    }

    pub fn with_limits(mut self, limits: RuntimeLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Tools whose `AppendMessage` directives are honoured.
    pub fn with_allowed_append_message_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_append_message_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Allow directives to insert `system` messages.
    pub fn with_system_inserts(mut self, allow: bool) -> Self {
        self.allow_system_inserts = allow;
        self
    }

    pub fn with_managed_files_root(mut self, root: Option<PathBuf>) -> Self {
        self.managed_files_root = root;
        self
    }

    pub fn with_structured_output_max_attempts(mut self, attempts: u32) -> Self {
        self.structured_output_max_attempts = attempts;
        self
    }

    /// Run independent tool calls of one step concurrently.
    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn limits(&self) -> RuntimeLimits {
        self.limits
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the step loop until a final answer, a budget fallback, or an error.
    ///
    /// The whole run is bounded by the limits' timeout; on expiry the
    /// in-flight provider or tool call is dropped and
    /// [`RelayError::Timeout`] is returned. Provider failures propagate
    /// unchanged. Tool failures never abort the run.
    pub async fn run(
        &self,
        state: State,
        ctx: &ToolContext,
        options: RunOptions,
    ) -> Result<RuntimeResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "run",
            run_id = %run_id,
            owner_id = %ctx.owner_id.as_deref().unwrap_or("-"),
            channel = %ctx.channel.as_deref().unwrap_or("-"),
        );
        let timeout = self.limits.timeout();

        async {
            match tokio::time::timeout(timeout, self.run_steps(state, ctx, &options)).await {
                Ok(result) => result,
                Err(_) => {
                    error!(timeout_secs = timeout.as_secs(), "Run timed out");
                    Err(RelayError::Timeout {
                        seconds: timeout.as_secs(),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_steps(
        &self,
        mut state: State,
        ctx: &ToolContext,
        options: &RunOptions,
    ) -> Result<RuntimeResult> {
        let api_mode = self.provider.api_mode();
        let renderer =
            MessageRenderer::new(api_mode).with_managed_files_root(self.managed_files_root.clone());
        let exec_options = ExecutionOptions::new(api_mode).with_parallel(self.parallel_tool_calls);
        let tools = self.registry.definitions();
        let structured = options.response_schema.is_some();
        let mut validator = structured
            .then(|| StructuredOutputValidator::new(self.structured_output_max_attempts));

        let mut usage = UsageAccumulator::new();
        let mut response_id = options.previous_response_id.clone();
        let mut follow_up: Option<Vec<RenderedMessage>> = None;
        let mut step: u32 = 0;
        let mut tool_calls_used: u32 = 0;

        info!(
            api_mode = %api_mode,
            messages = state.len(),
            tools = tools.len(),
            structured,
            "Starting run"
        );

        loop {
            if step >= self.limits.max_steps() {
                warn!(
                    step,
                    max_steps = self.limits.max_steps(),
                    "Reached maximum execution steps"
                );
                let payload = fallback_payload(MAX_STEPS_FALLBACK_TEXT, structured);
                return Ok(finish(payload, response_id, state, &usage));
            }

            // Chained responses only need the new items.
            let messages = match follow_up.take() {
                Some(items) if api_mode.is_responses() && response_id.is_some() => items,
                _ => renderer.render(&state.messages),
            };
            let request = self.build_request(
                messages,
                renderer.instructions(&state.messages),
                &tools,
                options,
                response_id.clone(),
            );
            debug!(
                step,
                messages = request.messages.len(),
                previous_response_id = ?request.previous_response_id,
                "Requesting completion"
            );

            let completion = self.provider.complete_once(&request).await?;
            usage.add(&completion.usage);
            if completion.response_id.is_some() {
                response_id = completion.response_id.clone();
            }
            info!(
                step,
                response_id = ?completion.response_id,
                tool_calls = completion.message.tool_calls.len(),
                tokens = %humanize_token_count(completion.usage.total.unwrap_or(0)),
                "Completion step received"
            );

            if !completion.has_tool_calls() {
                let content = completion.message.content;
                state.push(Message::assistant(&content));

                let Some(validator) = validator.as_mut() else {
                    return Ok(finish(Value::String(content), response_id, state, &usage));
                };

                match validator.receive(&content) {
                    ValidationAction::Valid { payload, attempts } => {
                        info!(attempts, "Structured output accepted");
                        return Ok(finish(payload, response_id, state, &usage));
                    }
                    ValidationAction::Retry {
                        prompt_patch,
                        attempts,
                        reason,
                        errors,
                    } => {
                        warn!(
                            attempts,
                            reason = %reason,
                            errors = ?errors,
                            candidate = %log_preview(&content, 200),
                            "Structured output rejected, retrying"
                        );
                        if let Some(patch) = prompt_patch.filter(|p| !p.trim().is_empty()) {
                            let message = Message::user(&patch);
                            follow_up = Some(renderer.render(std::slice::from_ref(&message)));
                            state.push(message);
                        }
                        step += 1;
                        continue;
                    }
                    ValidationAction::Fail {
                        attempts, reason, ..
                    } => {
                        error!(attempts, reason = %reason, "Structured output failed validation");
                        let payload = StructuredOutputValidator::fallback_payload();
                        return Ok(finish(payload, response_id, state, &usage));
                    }
                }
            }

            let calls = completion.message.tool_calls;
            let call_count = u32::try_from(calls.len()).unwrap_or(u32::MAX);
            tool_calls_used = tool_calls_used.saturating_add(call_count);
            if tool_calls_used > self.limits.max_tool_calls() {
                warn!(
                    step,
                    tool_calls_used,
                    max_tool_calls = self.limits.max_tool_calls(),
                    "Reached maximum tool calls"
                );
                let payload = fallback_payload(MAX_TOOL_CALLS_FALLBACK_TEXT, structured);
                return Ok(finish(payload, response_id, state, &usage));
            }

            state.push(Message::assistant_with_tool_calls(
                &completion.message.content,
                &calls,
            ));

            let records = execute_for_runtime(&calls, &self.registry, ctx, exec_options).await;
            let mut items = Vec::with_capacity(records.len());
            for record in records {
                state.push(tool_message(&record));
                items.push(record.payload.clone());
                for directive in &record.result.directives {
                    if let Some(message) = self.apply_directive(&record.tool_name, directive) {
                        items.extend(renderer.render(std::slice::from_ref(&message)));
                        state.push(message);
                    }
                }
            }
            follow_up = Some(items);
            step += 1;
        }
    }

    fn build_request(
        &self,
        messages: Vec<RenderedMessage>,
        instructions: Option<String>,
        tools: &[ToolDefinition],
        options: &RunOptions,
        previous_response_id: Option<String>,
    ) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages)
            .with_instructions(instructions)
            .with_tools(tools.to_vec())
            .with_response_schema(options.response_schema.clone())
            .with_prompt_cache_key(options.prompt_cache_key.clone())
            .with_previous_response_id(previous_response_id);
        request.max_output_tokens = self.max_output_tokens;
        request.temperature = self.temperature;
        request.reasoning_effort = self.reasoning_effort.clone();
        request
    }

    /// Vet a tool directive; returns the message to append, if allowed.
    fn apply_directive(&self, tool_name: &str, directive: &Directive) -> Option<Message> {
        match directive {
            Directive::AppendMessage { message } => {
                if !self.allowed_append_message_tools.contains(tool_name) {
                    warn!(tool = %tool_name, "Rejected append_message directive: tool not allowed");
                    return None;
                }
                if message.role == Role::System && !self.allow_system_inserts {
                    warn!(tool = %tool_name, "Rejected append_message directive: system inserts disabled");
                    return None;
                }
                debug!(tool = %tool_name, role = %message.role, "Applying append_message directive");
                Some(
                    message
                        .clone()
                        .with_metadata("synthetic", json!(true))
                        .with_metadata("source_tool", json!(tool_name)),
                )
            }
        }
    }
}

/// The state entry recording one tool outcome.
fn tool_message(record: &ExecutionRecord) -> Message {
    let part = match &record.result.content {
        Value::String(text) => Part::text(text.as_str()),
        other => Part::json(other.clone()),
    };
    let mut message = Message::new(Role::Tool, vec![part]);
    message.name = Some(record.tool_name.clone());
    message.tool_call_id = Some(record.call_id.clone());
    message
}

fn fallback_payload(text: &str, structured: bool) -> Value {
    if structured {
        structured_text_payload(text)
    } else {
        Value::String(text.to_string())
    }
}

fn finish(
    payload: Value,
    response_id: Option<String>,
    state: State,
    usage: &UsageAccumulator,
) -> RuntimeResult {
    let total_tokens = usage.total_or_zero();
    info!(
        response_id = ?response_id,
        total_tokens = %humanize_token_count(total_tokens),
        provider_calls = usage.calls(),
        "Run finished"
    );
    RuntimeResult {
        payload,
        response_id,
        state,
        total_tokens,
    }
}
