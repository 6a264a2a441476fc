//! Turn-level completion driver
//!
//! A coarser loop than [`AgentRuntime`](super::AgentRuntime) for callers
//! that just want an answer for one user message. The conversation is
//! rebuilt from a plain history each turn, tool rounds are bounded by an
//! iteration budget and a repeated-iteration guard, and token usage is
//! summed over every provider call, including a single auto-continuation of
//! a truncated response.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, DEFAULT_SYSTEM_PROMPT};
use crate::error::Result;
use crate::providers::{
    CompletionProvider, CompletionRequest, CompletionStep, RenderedContent, RenderedMessage,
    ToolDefinition, UsageAccumulator,
};
use crate::session::Role;
use crate::tools::arguments::parse_json_with_fenced_fallback;
use crate::tools::{execute_for_runtime, ExecutionOptions, ToolContext, ToolRegistry};
use crate::utils::string::{humanize_token_count, log_preview};

use super::loop_guard::ToolLoopGuard;

/// User message sent to resume a response cut off by the output limit.
pub const CONTINUATION_PROMPT: &str = "Continue exactly where you left off. Do not repeat.";

const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 8;

/// One prior exchange in the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Input for one [`CompletionDriver::generate`] turn.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Earlier turns, oldest first
    pub history: Vec<HistoryEntry>,
    /// The new user message
    pub user_message: String,
    /// Provider-native user content sent instead of `user_message`
    pub raw_user_content: Option<Value>,
    /// Tools offered this turn
    pub tools: Option<ToolRegistry>,
    /// Identity passed to tool handlers
    pub tool_context: ToolContext,
    /// JSON schema the final answer must follow
    pub response_schema: Option<Value>,
    /// Provider prompt-cache routing key
    pub prompt_cache_key: Option<String>,
    /// Response to chain from
    pub previous_response_id: Option<String>,
    /// Replaces the configured system prompt
    pub system_prompt: Option<String>,
}

impl GenerateRequest {
    pub fn new(user_message: &str) -> Self {
        Self {
            user_message: user_message.to_string(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_raw_user_content(mut self, content: Value) -> Self {
        self.raw_user_content = Some(content);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_context(mut self, ctx: ToolContext) -> Self {
        self.tool_context = ctx;
        self
    }

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

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }
}

/// Result of one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    /// Final answer: a string, or parsed JSON when a schema was active
    pub payload: Value,
    pub response_id: Option<String>,
    pub total_tokens: Option<u64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cached_input_tokens: Option<u64>,
    pub reasoning_output_tokens: Option<u64>,
    /// Status of the last response (`completed`, `incomplete`, ...)
    pub status: Option<String>,
    pub incomplete_reason: Option<String>,
}

impl Generation {
    fn new(payload: Value, response_id: Option<String>, usage: &UsageAccumulator) -> Self {
        Self {
            payload,
            response_id,
            total_tokens: usage.total_tokens(),
            input_tokens: usage.input_tokens(),
            output_tokens: usage.output_tokens(),
            cached_input_tokens: usage.cached_input_tokens(),
            reasoning_output_tokens: usage.reasoning_output_tokens(),
            status: None,
            incomplete_reason: None,
        }
    }

    /// The answer as text, when it is a string.
    pub fn text(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

/// Per-turn values shared by every request of the turn.
struct TurnContext {
    instructions: Option<String>,
    tools: Vec<ToolDefinition>,
    schema: Option<Value>,
    prompt_cache_key: Option<String>,
}

/// Runs whole turns against a completion provider.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use relaybot::agent::{CompletionDriver, GenerateRequest};
/// use relaybot::providers::{CompletionStep, ScriptedProvider};
///
/// # tokio_test::block_on(async {
/// let provider = Arc::new(ScriptedProvider::new().then_step(CompletionStep::text("Paris")));
/// let driver = CompletionDriver::new(provider).with_system_prompt("Answer in one word.");
///
/// let generation = driver.generate(GenerateRequest::new("Capital of France?")).await.unwrap();
/// assert_eq!(generation.text(), Some("Paris"));
/// # });
/// ```
pub struct CompletionDriver {
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    max_tool_iterations: u32,
    prompt_cache_enabled: bool,
    parallel_tool_calls: bool,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    reasoning_effort: Option<String>,
}

impl CompletionDriver {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            prompt_cache_enabled: true,
            parallel_tool_calls: false,
            max_output_tokens: None,
            temperature: None,
            reasoning_effort: None,
        }
    }

    /// Create a driver from configuration.
    ///
    /// Fails when a configured `system_prompt_file` cannot be used.
    pub fn from_config(provider: Arc<dyn CompletionProvider>, config: &Config) -> Result<Self> {
        let mut driver = Self::new(provider)
            .with_system_prompt(&config.system_prompt()?)
            .with_max_tool_iterations(config.runtime.max_tool_iterations)
            .with_prompt_cache(config.llm.prompt_cache_enabled)
            .with_parallel_tool_calls(config.runtime.parallel_tool_calls);
        driver.max_output_tokens = config.llm.max_output_tokens;
        driver.temperature = config.llm.temperature;
        driver.reasoning_effort = config.llm.reasoning_effort.clone();
        Ok(driver)
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Tool rounds allowed per turn (at least one).
    pub fn with_max_tool_iterations(mut self, iterations: u32) -> Self {
        self.max_tool_iterations = iterations.max(1);
        self
    }

    /// Whether prompt-cache keys are forwarded to the provider.
    pub fn with_prompt_cache(mut self, enabled: bool) -> Self {
        self.prompt_cache_enabled = enabled;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Run one turn to a final answer or a loop fallback.
    pub async fn generate(&self, request: GenerateRequest) -> Result<Generation> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "generate",
            run_id = %run_id,
            owner_id = %request.tool_context.owner_id.as_deref().unwrap_or("-"),
            channel = %request.tool_context.channel.as_deref().unwrap_or("-"),
        );
        self.generate_turn(request).instrument(span).await
    }

    async fn generate_turn(&self, request: GenerateRequest) -> Result<Generation> {
        let api_mode = self.provider.api_mode();
        let responses = api_mode.is_responses();
        let system = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.system_prompt.clone());
        let has_system = !system.trim().is_empty();
        let registry = request.tools.as_ref().filter(|r| !r.is_empty());
        let exec_options = ExecutionOptions::new(api_mode).with_parallel(self.parallel_tool_calls);

        let mut turn = TurnContext {
            instructions: (responses && has_system).then(|| system.clone()),
            tools: registry.map(ToolRegistry::definitions).unwrap_or_default(),
            schema: request.response_schema.clone(),
            prompt_cache_key: request
                .prompt_cache_key
                .clone()
                .filter(|_| self.prompt_cache_enabled),
        };

        let mut conversation = Vec::with_capacity(request.history.len() + 2);
        if !responses && has_system {
            conversation.push(RenderedMessage::text(Role::System, &system));
        }
        for entry in &request.history {
            conversation.push(RenderedMessage::text(entry.role, &entry.content));
        }
        let user_content = match &request.raw_user_content {
            Some(raw) => RenderedContent::Raw(raw.clone()),
            None => RenderedContent::Text(request.user_message.clone()),
        };
        conversation.push(RenderedMessage::Message {
            role: Role::User,
            content: user_content,
            tool_calls: Vec::new(),
        });

        info!(
            api_mode = %api_mode,
            history = request.history.len(),
            tools = turn.tools.len(),
            structured = turn.schema.is_some(),
            "Starting turn"
        );

        let mut usage = UsageAccumulator::new();
        let mut guard = ToolLoopGuard::new();
        let mut chain_id = request.previous_response_id.clone();
        let mut iterations: u32 = 0;

        loop {
            let step = self
                .complete(&mut turn, conversation.clone(), chain_id.clone())
                .await?;
            usage.add(&step.usage);
            debug!(
                iteration = iterations,
                response_id = ?step.response_id,
                tool_calls = step.message.tool_calls.len(),
                "Completion received"
            );

            let registry = match registry {
                Some(registry) if step.has_tool_calls() => registry,
                _ => return self.finalize(step, &turn, &mut usage).await,
            };

            let records = execute_for_runtime(
                &step.message.tool_calls,
                registry,
                &request.tool_context,
                exec_options,
            )
            .await;
            iterations += 1;

            if guard.observe(&records) {
                crate::log_component!(
                    warn,
                    "driver",
                    "Repeated tool iterations detected, stopping turn",
                    iterations = iterations,
                    repeats = guard.repeats()
                );
                let payload = guard.fallback_payload(turn.schema.is_some());
                return Ok(Generation::new(payload, step.response_id, &usage));
            }
            if iterations >= self.max_tool_iterations {
                warn!(
                    iterations,
                    max_tool_iterations = self.max_tool_iterations,
                    "Reached maximum tool iterations"
                );
                let payload = guard.fallback_payload(turn.schema.is_some());
                return Ok(Generation::new(payload, step.response_id, &usage));
            }

            let outputs = records.into_iter().map(|r| r.payload);
            match (&step.response_id, responses) {
                (Some(id), true) => {
                    chain_id = Some(id.clone());
                    conversation = outputs.collect();
                }
                _ => {
                    conversation.push(RenderedMessage::Message {
                        role: Role::Assistant,
                        content: RenderedContent::Text(step.message.content.clone()),
                        tool_calls: step.message.tool_calls.clone(),
                    });
                    conversation.extend(outputs);
                }
            }
        }
    }

    /// One provider call, retried once without the schema if the provider
    /// refuses it. A dropped schema stays dropped for the rest of the turn.
    async fn complete(
        &self,
        turn: &mut TurnContext,
        messages: Vec<RenderedMessage>,
        previous_response_id: Option<String>,
    ) -> Result<CompletionStep> {
        let request = self.build_request(turn, messages, previous_response_id);
        let outcome = self.provider.complete_once(&request).await;
        match outcome {
            Ok(step) => Ok(step),
            Err(err) if turn.schema.is_some() && err.rejects_response_schema() => {
                warn!(error = %err, "Provider rejected response schema, retrying without it");
                turn.schema = None;
                let retry = request.with_response_schema(None);
                Ok(self.provider.complete_once(&retry).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn finalize(
        &self,
        step: CompletionStep,
        turn: &TurnContext,
        usage: &mut UsageAccumulator,
    ) -> Result<Generation> {
        let mut text = step.message.content;
        let mut response_id = step.response_id;
        let mut status = step.usage.status.clone();
        let mut incomplete_reason = step.usage.incomplete_reason.clone();

        if step.usage.should_auto_continue() {
            if let Some(id) = response_id.clone() {
                info!(
                    response_id = %id,
                    reason = ?incomplete_reason,
                    "Response truncated, requesting continuation"
                );
                let mut request = self.build_request(
                    turn,
                    vec![RenderedMessage::text(Role::User, CONTINUATION_PROMPT)],
                    Some(id),
                );
                request.tools.clear();
                let continuation = self.provider.complete_once(&request).await?;
                usage.add(&continuation.usage);
                text.push_str(&continuation.message.content);
                if continuation.response_id.is_some() {
                    response_id = continuation.response_id;
                }
                status = continuation.usage.status;
                incomplete_reason = continuation.usage.incomplete_reason;
            }
        }

        let payload = match &turn.schema {
            Some(_) => match parse_json_with_fenced_fallback(&text) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        error = %e,
                        preview = %log_preview(&text, 200),
                        "Structured answer is not valid JSON, returning raw text"
                    );
                    Value::String(text)
                }
            },
            None => Value::String(text),
        };

        let mut generation = Generation::new(payload, response_id, usage);
        generation.status = status;
        generation.incomplete_reason = incomplete_reason;
        info!(
            response_id = ?generation.response_id,
            total_tokens = %humanize_token_count(generation.total_tokens.unwrap_or(0)),
            provider_calls = usage.calls(),
            "Turn finished"
        );
        Ok(generation)
    }

    fn build_request(
        &self,
        turn: &TurnContext,
        messages: Vec<RenderedMessage>,
        previous_response_id: Option<String>,
    ) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages)
            .with_instructions(turn.instructions.clone())
            .with_tools(turn.tools.clone())
            .with_response_schema(turn.schema.clone())
            .with_prompt_cache_key(turn.prompt_cache_key.clone())
            .with_previous_response_id(previous_response_id);
        request.max_output_tokens = self.max_output_tokens;
        request.temperature = self.temperature;
        request.reasoning_effort = self.reasoning_effort.clone();
        request
    }
}
