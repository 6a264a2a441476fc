//! A deterministic provider that replays a prepared script.
//!
//! Used by scenario tests and by callers that want to dry-run a tool set
//! without a network provider. Every request is recorded so tests can assert
//! on exactly what the engine sent.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::providers::types::{ApiMode, CompletionProvider, CompletionRequest, CompletionStep};

/// Replays queued completion outcomes in order.
///
/// # Example
/// ```
/// use relaybot::providers::{CompletionProvider, CompletionRequest, CompletionStep, ScriptedProvider};
///
/// # tokio_test::block_on(async {
/// let provider = ScriptedProvider::new().then_step(CompletionStep::text("hi"));
/// let step = provider.complete_once(&CompletionRequest::default()).await.unwrap();
/// assert_eq!(step.message.content, "hi");
/// assert_eq!(provider.call_count(), 1);
/// # });
/// ```
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<CompletionStep, ProviderError>>>,
    repeat: Option<CompletionStep>,
    requests: Mutex<Vec<CompletionRequest>>,
    api_mode: ApiMode,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    /// Create an empty script in chat-completions mode.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            api_mode: ApiMode::ChatCompletions,
            delay: None,
        }
    }

    /// Queue a successful step.
    pub fn then_step(self, step: CompletionStep) -> Self {
        self.then(Ok(step))
    }

    /// Queue a provider failure.
    pub fn then_error(self, err: ProviderError) -> Self {
        self.then(Err(err))
    }

    fn then(self, outcome: Result<CompletionStep, ProviderError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
        self
    }

    /// Step returned once the queue is drained.
    pub fn repeating(mut self, step: CompletionStep) -> Self {
        self.repeat = Some(step);
        self
    }

    /// Switch the advertised API mode.
    pub fn with_api_mode(mut self, api_mode: ApiMode) -> Self {
        self.api_mode = api_mode;
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete_once(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStep, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(outcome) => outcome,
            None => self
                .repeat
                .clone()
                .ok_or_else(|| ProviderError::Unknown("script exhausted".to_string())),
        }
    }

    fn api_mode(&self) -> ApiMode {
        self.api_mode
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
