//! Scenario tests for the completion driver
//!
//! Whole turns through `CompletionDriver::generate`: continuation, loop
//! detection, schema fallback and response chaining.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use relaybot::{
    agent::{CompletionDriver, GenerateRequest, HistoryEntry, CONTINUATION_PROMPT},
    config::Config,
    error::{ProviderError, ToolError},
    providers::{
        ApiMode, CompletionStep, ProviderToolCall, RenderedContent, RenderedMessage,
        ScriptedProvider, ToolArguments, UsageSnapshot,
    },
    session::Role,
    tools::{FnTool, ToolContext, ToolRegistry, ToolResult},
};

fn search_call(id: &str) -> CompletionStep {
    CompletionStep::tool_calls(
        "",
        vec![ProviderToolCall::new(
            id,
            "search",
            ToolArguments::Text(r#"{"q": "weather"}"#.into()),
        )],
    )
}

fn search_tools(output: &'static str) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(FnTool::new(
        "search",
        "Search the web",
        json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        move |_args, _ctx| async move { Ok::<_, ToolError>(ToolResult::text(output)) },
    ));
    registry
}

#[tokio::test]
async fn test_truncated_response_continues_once() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .with_api_mode(ApiMode::Responses)
            .then_step(
                CompletionStep::text("The quick brown fox ")
                    .with_response_id("resp_1")
                    .with_usage(UsageSnapshot::with_io(100, 50).incomplete("max_output_tokens")),
            )
            .then_step(
                CompletionStep::text("jumps over the lazy dog.")
                    .with_response_id("resp_2")
                    .with_usage(UsageSnapshot::with_io(20, 10)),
            ),
    );
    let driver = CompletionDriver::new(provider.clone());
    let generation = driver
        .generate(GenerateRequest::new("Tell me the pangram"))
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 2);
    assert_eq!(
        generation.text(),
        Some("The quick brown fox jumps over the lazy dog.")
    );
    assert_eq!(generation.total_tokens, Some(180));
    assert_eq!(generation.input_tokens, Some(120));
    assert_eq!(generation.output_tokens, Some(60));
    assert_eq!(generation.response_id.as_deref(), Some("resp_2"));
    assert!(generation.status.is_none());

    let continuation = &provider.requests()[1];
    assert_eq!(continuation.previous_response_id.as_deref(), Some("resp_1"));
    assert_eq!(
        continuation.messages,
        vec![RenderedMessage::text(Role::User, CONTINUATION_PROMPT)]
    );
}

#[tokio::test]
async fn test_other_incomplete_reasons_do_not_continue() {
    let provider = Arc::new(
        ScriptedProvider::new().then_step(
            CompletionStep::text("partial")
                .with_response_id("resp_1")
                .with_usage(UsageSnapshot::with_total(9).incomplete("content_filter")),
        ),
    );
    let generation = CompletionDriver::new(provider.clone())
        .generate(GenerateRequest::new("x"))
        .await
        .unwrap();
    assert_eq!(provider.call_count(), 1);
    assert_eq!(generation.incomplete_reason.as_deref(), Some("content_filter"));
}

#[tokio::test]
async fn test_repeated_iterations_trip_loop_guard() {
    let provider = Arc::new(ScriptedProvider::new().repeating(search_call("call_s")));
    let driver = CompletionDriver::new(provider.clone()).with_max_tool_iterations(10);
    let generation = driver
        .generate(GenerateRequest::new("weather?").with_tools(search_tools("sunny, 21C")))
        .await
        .unwrap();

    // Third identical iteration trips the guard; no fourth request.
    assert_eq!(provider.call_count(), 3);
    let text = generation.text().unwrap();
    assert!(text.starts_with("I executed tool calls but hit an internal tool-loop safeguard"));
    assert!(text.contains("Recent tools: search, search, search."));
    assert!(text.ends_with("Last tool output: sunny, 21C"));
}

#[tokio::test]
async fn test_changing_outputs_do_not_trip_guard() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    let seen = counter.clone();
    registry.register(FnTool::new(
        "search",
        "Search the web",
        json!({"type": "object"}),
        move |_args, _ctx| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ToolError>(ToolResult::text(format!("page {}", n))) }
        },
    ));

    let provider = Arc::new(
        ScriptedProvider::new()
            .then_step(search_call("a"))
            .then_step(search_call("b"))
            .then_step(search_call("c"))
            .then_step(search_call("d"))
            .then_step(CompletionStep::text("found it")),
    );
    let generation = CompletionDriver::new(provider.clone())
        .generate(GenerateRequest::new("dig").with_tools(registry))
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 5);
    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert_eq!(generation.text(), Some("found it"));
}

#[tokio::test]
async fn test_structured_loop_fallback_is_wrapped() {
    let provider = Arc::new(ScriptedProvider::new().repeating(search_call("call_s")));
    let generation = CompletionDriver::new(provider)
        .generate(
            GenerateRequest::new("weather?")
                .with_tools(search_tools("cloudy"))
                .with_response_schema(json!({"type": "object"})),
        )
        .await
        .unwrap();

    assert_eq!(generation.payload["answer"]["kind"], "text");
    assert_eq!(generation.payload["should_answer_to_user"], true);
    assert!(generation.payload["answer"]["content"]
        .as_str()
        .unwrap()
        .contains("Last tool output: cloudy"));
}

#[tokio::test]
async fn test_json_mode_rejection_falls_back_to_text() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_error(ProviderError::InvalidRequest(
                r#"{"error":{"message":"json mode is not supported for this model"}}"#.into(),
            ))
            .then_step(CompletionStep::text("Here is a plain answer.")),
    );
    let generation = CompletionDriver::new(provider.clone())
        .generate(GenerateRequest::new("hi").with_response_schema(json!({"type": "object"})))
        .await
        .unwrap();

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].response_schema.is_some());
    assert!(requests[1].response_schema.is_none());
    assert_eq!(generation.payload, json!("Here is a plain answer."));
}

#[tokio::test]
async fn test_responses_mode_chains_tool_outputs() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .with_api_mode(ApiMode::Responses)
            .then_step(search_call("fc_1").with_response_id("resp_1"))
            .then_step(CompletionStep::text("Sunny.").with_response_id("resp_2")),
    );
    let driver = CompletionDriver::new(provider.clone()).with_system_prompt("Be a forecaster.");
    let generation = driver
        .generate(
            GenerateRequest::new("weather?")
                .with_history(vec![HistoryEntry::user("hello"), HistoryEntry::assistant("hi")])
                .with_tools(search_tools("sunny"))
                .with_tool_context(ToolContext::new().with_owner("owner-7")),
        )
        .await
        .unwrap();
    assert_eq!(generation.response_id.as_deref(), Some("resp_2"));

    let requests = provider.requests();
    assert_eq!(requests[0].instructions.as_deref(), Some("Be a forecaster."));
    assert_eq!(requests[0].messages.len(), 3);
    assert_eq!(requests[0].tools.len(), 1);

    assert_eq!(requests[1].previous_response_id.as_deref(), Some("resp_1"));
    assert_eq!(
        requests[1].messages,
        vec![RenderedMessage::FunctionCallOutput {
            call_id: "fc_1".into(),
            output: "sunny".into(),
        }]
    );
}

#[tokio::test]
async fn test_raw_user_content_is_sent_verbatim() {
    let raw = json!([
        {"type": "input_text", "text": "describe"},
        {"type": "input_image", "image_url": "https://example.com/cat.png"}
    ]);
    let provider = Arc::new(ScriptedProvider::new().then_step(CompletionStep::text("a cat")));
    CompletionDriver::new(provider.clone())
        .with_system_prompt("")
        .generate(GenerateRequest::new("").with_raw_user_content(raw.clone()))
        .await
        .unwrap();

    assert_eq!(
        provider.requests()[0].messages,
        vec![RenderedMessage::Message {
            role: Role::User,
            content: RenderedContent::Raw(raw),
            tool_calls: Vec::new(),
        }]
    );
}

#[tokio::test]
async fn test_driver_from_config() {
    let mut config = Config::default();
    config.llm.system_prompt = "Configured prompt".into();
    config.llm.prompt_cache_enabled = false;
    config.llm.max_output_tokens = Some(256);

    let provider = Arc::new(ScriptedProvider::new().then_step(CompletionStep::text("ok")));
    let driver = CompletionDriver::from_config(provider.clone(), &config).unwrap();
    driver
        .generate(GenerateRequest::new("hi").with_prompt_cache_key("user:1"))
        .await
        .unwrap();

    let request = &provider.requests()[0];
    assert_eq!(request.messages[0], RenderedMessage::text(Role::System, "Configured prompt"));
    assert!(request.prompt_cache_key.is_none());
    assert_eq!(request.max_output_tokens, Some(256));
}
