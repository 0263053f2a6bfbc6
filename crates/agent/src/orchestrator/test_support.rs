//! Shared test helpers for orchestrator tests.

use async_trait::async_trait;
use decisionflow_core::envelope::Block;
use decisionflow_core::error::{ProviderError, ToolError};
use decisionflow_core::message::{Message, MessageToolCall};
use decisionflow_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use decisionflow_core::tool::{SideEffects, Tool, ToolContext, ToolOutcome};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Returns queued responses in order, then errors once the script runs out.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .get(n)
            .cloned()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: format!("script exhausted at call #{n}"),
            })
    }
}

/// Always fails.
pub struct FailingProvider {
    error: ProviderError,
}

impl FailingProvider {
    pub fn network() -> Self {
        Self {
            error: ProviderError::Network("connection reset".into()),
        }
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(self.error.clone())
    }
}

/// Sleeps before answering; used with paused time for timeout paths.
pub struct SleepingProvider {
    delay: Duration,
    text: String,
    calls: AtomicUsize,
}

impl SleepingProvider {
    pub fn new(delay: Duration, text: &str) -> Self {
        Self {
            delay,
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for SleepingProvider {
    fn name(&self) -> &str {
        "sleeping"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(text_response(&self.text))
    }
}

/// Panics on every call.
pub struct PanickingProvider;

#[async_trait]
impl Provider for PanickingProvider {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        panic!("provider blew up")
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        extensions: BTreeMap::new(),
    }
}

/// A response carrying tool calls as `(name, raw JSON arguments)`.
pub fn tool_call_response(text: &str, calls: Vec<(&str, &str)>) -> ProviderResponse {
    let mut response = text_response(text);
    response.message.tool_calls = calls
        .into_iter()
        .enumerate()
        .map(|(i, (name, arguments))| MessageToolCall {
            id: format!("call_{i}_{name}"),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
        .collect();
    response
}

/// A tool with a fixed result.
pub struct StubTool {
    name: &'static str,
    result: Result<ToolOutcome, ToolError>,
    calls: Arc<AtomicUsize>,
}

impl StubTool {
    pub fn ok(name: &'static str, text: &str, side_effects: SideEffects) -> Self {
        Self {
            name,
            result: Ok(ToolOutcome {
                success: true,
                text: Some(text.to_string()),
                blocks: vec![Block::Commentary {
                    text: format!("{name} ran"),
                }],
                side_effects,
                ..Default::default()
            }),
            calls: Arc::default(),
        }
    }

    pub fn failing(name: &'static str, error: ToolError) -> Self {
        Self {
            name,
            result: Err(error),
            calls: Arc::default(),
        }
    }

    /// Shared call counter, still readable after the tool is boxed.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "stub"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        _arguments: serde_json::Value,
    ) -> Result<ToolOutcome, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
