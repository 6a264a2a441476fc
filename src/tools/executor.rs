//! Tool call execution
//!
//! Turns the tool calls of one provider step into [`ExecutionRecord`]s.
//! Every failure (bad arguments, unknown tool, handler error, handler
//! panic) is recovered into a structured error result so that the model
//! sees it as tool output; nothing here aborts the run.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use crate::error::ToolError;
use crate::providers::{ApiMode, ProviderToolCall, RenderedMessage, ToolArguments};
use crate::utils::sanitize::sanitize_arguments_for_log;

use super::arguments::decode_tool_arguments;
use super::{ToolContext, ToolRegistry, ToolResult};

/// Name reported for calls that arrive without one.
pub const UNKNOWN_TOOL_NAME: &str = "unknown_tool";

/// Outcome of one tool call, ready to feed back to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    /// Name of the tool that was (or would have been) invoked
    pub tool_name: String,
    /// Correlation id for the provider
    pub call_id: String,
    /// Provider-shaped result message
    pub payload: RenderedMessage,
    /// Normalized handler result (or structured error)
    pub result: ToolResult,
}

/// How a batch of tool calls is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Request family; selects the payload shape and call-id source
    pub api_mode: ApiMode,
    /// Run the calls of one step concurrently
    pub parallel: bool,
}

impl ExecutionOptions {
    /// Sequential execution for the given mode.
    pub fn new(api_mode: ApiMode) -> Self {
        Self {
            api_mode,
            parallel: false,
        }
    }

    /// Enable or disable concurrent execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Execute a step's tool calls and return one record per call, in call order.
///
/// With `options.parallel` set the handlers run concurrently; records are
/// still returned in the order the calls were made so that correlation ids
/// line up with the assistant message.
pub async fn execute_for_runtime(
    calls: &[ProviderToolCall],
    registry: &ToolRegistry,
    ctx: &ToolContext,
    options: ExecutionOptions,
) -> Vec<ExecutionRecord> {
    let responses_mode = options.api_mode.is_responses();
    if options.parallel && calls.len() > 1 {
        join_all(
            calls
                .iter()
                .map(|call| execute_one(call, registry, ctx, responses_mode)),
        )
        .await
    } else {
        let mut records = Vec::with_capacity(calls.len());
        for call in calls {
            records.push(execute_one(call, registry, ctx, responses_mode).await);
        }
        records
    }
}

async fn execute_one(
    call: &ProviderToolCall,
    registry: &ToolRegistry,
    ctx: &ToolContext,
    responses_mode: bool,
) -> ExecutionRecord {
    let call_id = resolve_call_id(call, responses_mode);
    let tool_name = if call.name.is_empty() {
        UNKNOWN_TOOL_NAME.to_string()
    } else {
        call.name.clone()
    };

    let start = Instant::now();
    let result = match invoke(call, &call_id, registry, ctx).await {
        Ok(result) => {
            info!(
                tool = %tool_name,
                call_id = %call_id,
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool executed successfully"
            );
            result
        }
        Err(e) => {
            error!(
                tool = %tool_name,
                call_id = %call_id,
                owner_id = ctx.owner_id.as_deref().unwrap_or(""),
                error_code = e.kind.code(),
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Tool execution failed"
            );
            error_result(&tool_name, &e)
        }
    };

    let output = stringify_result(&result.content);
    let payload = if responses_mode {
        RenderedMessage::FunctionCallOutput {
            call_id: call_id.clone(),
            output,
        }
    } else {
        RenderedMessage::ToolResult {
            name: tool_name.clone(),
            tool_call_id: call_id.clone(),
            content: output,
        }
    };

    ExecutionRecord {
        tool_name,
        call_id,
        payload,
        result,
    }
}

async fn invoke(
    call: &ProviderToolCall,
    call_id: &str,
    registry: &ToolRegistry,
    ctx: &ToolContext,
) -> Result<ToolResult, ToolError> {
    let (name, arguments) = parse_tool_call(call)?;
    let binding = registry
        .get(&name)
        .ok_or_else(|| ToolError::execution_failed(format!("tool {} is not registered", name)))?;

    debug!(
        tool = %name,
        call_id = %call_id,
        owner_id = ctx.owner_id.as_deref().unwrap_or(""),
        argument_keys = ?arguments.keys().collect::<Vec<_>>(),
        arguments = %sanitize_arguments_for_log(&arguments),
        "Executing tool"
    );

    match AssertUnwindSafe(binding.tool.execute(arguments, ctx))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => Err(ToolError::execution_failed(format!(
            "tool {} panicked: {}",
            name,
            panic_message(panic.as_ref())
        ))),
    }
}

/// Resolve a call's tool name and decoded argument object.
///
/// String arguments go through [`decode_tool_arguments`]. When the
/// arguments are blank and the provider sent an `input` block instead,
/// that block is used as the argument object.
pub fn parse_tool_call(call: &ProviderToolCall) -> Result<(String, Map<String, Value>), ToolError> {
    if call.name.is_empty() {
        return Err(ToolError::execution_failed("Tool call missing name"));
    }
    let arguments = match &call.arguments {
        ToolArguments::Object(map) => map.clone(),
        ToolArguments::Text(text) if text.trim().is_empty() => {
            call.input.clone().unwrap_or_default()
        }
        ToolArguments::Text(text) => decode_tool_arguments(text)?,
    };
    Ok((call.name.clone(), arguments))
}

fn resolve_call_id(call: &ProviderToolCall, responses_mode: bool) -> String {
    if responses_mode {
        if let Some(id) = call
            .input
            .as_ref()
            .and_then(|input| input.get("call_id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        {
            return id.to_string();
        }
    }
    call.id.clone()
}

fn error_result(tool_name: &str, err: &ToolError) -> ToolResult {
    ToolResult::new(json!({
        "ok": false,
        "tool": tool_name,
        "error_code": err.kind.code(),
        "error": err.message,
    }))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Render tool content as the string fed back to the model.
///
/// Strings pass through verbatim; everything else is compact JSON.
///
/// # Example
/// ```
/// use relaybot::tools::stringify_result;
/// use serde_json::json;
///
/// assert_eq!(stringify_result(&json!("done")), "done");
/// assert_eq!(stringify_result(&json!({"ok": true})), r#"{"ok":true}"#);
/// assert_eq!(stringify_result(&json!(3)), "3");
/// ```
pub fn stringify_result(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
