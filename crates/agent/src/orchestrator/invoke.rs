//! LLM invocation with two timeout regimes.
//!
//! - **ack**: plain chat call, short timeout. Never fails; any provider
//!   failure or timeout degrades to the configured fallback text.
//! - **full**: tool-enabled call, long timeout. Failures are returned to
//!   the orchestrator, which reports them as a pipeline error.
//!
//! Both race the provider against the turn's cancellation token.

use crate::cache::BoundedCache;
use crate::context::ContextPack;
use crate::context::canonical;
use decisionflow_core::error::ProviderError;
use decisionflow_core::message::{Message, MessageToolCall};
use decisionflow_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use decisionflow_core::tool::ToolCall;
use decisionflow_core::Outcome;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const ACK_INSTRUCTION_PREFIX: &str = "Acknowledge the system event in one or two sentences:";
pub const FULL_INSTRUCTION: &str =
    "Respond to the current message. Cite canonical facts as [fact:ID] when you use them.";

#[derive(Debug, Clone)]
pub struct InvokerSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub ack_timeout_ms: u64,
    pub reasoning_timeout_ms: u64,
    pub ack_fallback_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmPath {
    Ack,
    Full,
}

impl LlmPath {
    pub fn as_str(self) -> &'static str {
        match self {
            LlmPath::Ack => "ack",
            LlmPath::Full => "full",
        }
    }
}

/// What the pipeline takes from an LLM call.
#[derive(Debug, Clone)]
pub struct LlmReply {
    pub path: LlmPath,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub cached: bool,
    pub outcome: Outcome,
    pub degraded_reason: Option<String>,
    pub duration_ms: u64,
}

pub struct LlmInvoker {
    provider: Arc<dyn Provider>,
    settings: InvokerSettings,
    responses: Option<BoundedCache<ProviderResponse>>,
}

impl LlmInvoker {
    pub fn new(provider: Arc<dyn Provider>, settings: InvokerSettings) -> Self {
        Self {
            provider,
            settings,
            responses: None,
        }
    }

    /// Cache successful responses by a hash of the call's semantic inputs.
    pub fn with_response_cache(mut self, capacity: usize) -> Self {
        self.responses = Some(BoundedCache::new(capacity));
        self
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Test reset hook for the response cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.responses {
            cache.clear();
        }
    }

    /// The short, tool-free acknowledgement call.
    pub async fn acknowledge(
        &self,
        pack: &ContextPack,
        event_kind: &str,
        cancel: &CancellationToken,
    ) -> LlmReply {
        let messages = vec![
            Message::system(pack.system_prompt()),
            Message::user(format!("{ACK_INSTRUCTION_PREFIX} {event_kind}")),
        ];
        let request = self.request(messages, Vec::new(), self.settings.ack_timeout_ms);
        let started = Instant::now();

        match self.call(request, cancel).await {
            Ok((response, cached)) if !response.message.content.trim().is_empty() => LlmReply {
                path: LlmPath::Ack,
                text: response.message.content,
                tool_calls: Vec::new(),
                usage: response.usage,
                cached,
                outcome: Outcome::Ok,
                degraded_reason: None,
                duration_ms: elapsed_ms(started),
            },
            Ok(_) => self.fallback(started, "ack_empty_response".into()),
            Err(e) => {
                warn!(error = %e, "Acknowledgement call failed, using fallback text");
                let reason = if e.is_timeout() {
                    "ack_timeout".to_string()
                } else {
                    format!("ack_failed: {e}")
                };
                self.fallback(started, reason)
            }
        }
    }

    /// The tool-enabled reasoning call.
    pub async fn reason(
        &self,
        pack: &ContextPack,
        notes: &[String],
        tools: Vec<ToolDefinition>,
        cancel: &CancellationToken,
    ) -> Result<LlmReply, ProviderError> {
        let mut messages = vec![Message::system(pack.system_prompt())];
        if !notes.is_empty() {
            let mut text = String::from("Specialist notes:");
            for note in notes {
                text.push_str("\n- ");
                text.push_str(note);
            }
            messages.push(Message::system(text));
        }
        messages.push(Message::user(FULL_INSTRUCTION));

        let request = self.request(messages, tools, self.settings.reasoning_timeout_ms);
        let started = Instant::now();
        let (response, cached) = self.call(request, cancel).await?;

        Ok(LlmReply {
            path: LlmPath::Full,
            text: response.message.content,
            tool_calls: response.message.tool_calls.iter().map(parse_tool_call).collect(),
            usage: response.usage,
            cached,
            outcome: Outcome::Ok,
            degraded_reason: None,
            duration_ms: elapsed_ms(started),
        })
    }

    fn request(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        timeout_ms: u64,
    ) -> ProviderRequest {
        let mut request = ProviderRequest::chat(self.settings.model.clone(), messages).with_tools(tools);
        request.temperature = self.settings.temperature;
        request.max_tokens = Some(self.settings.max_tokens);
        request.timeout_ms = Some(timeout_ms);
        request
    }

    async fn call(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<(ProviderResponse, bool), ProviderError> {
        let key = cache_key(&request);
        if let Some(cached) = self.responses.as_ref().and_then(|c| c.get(&key)) {
            debug!(cache_key = %key, "LLM response cache hit");
            return Ok((cached, true));
        }

        let timeout_ms = request.timeout_ms.unwrap_or(self.settings.reasoning_timeout_ms);
        let response = tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            result = tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                self.provider.complete(request),
            ) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ProviderError::Timeout { timeout_ms }),
            },
        }?;

        if let Some(cache) = &self.responses {
            cache.insert(key, response.clone());
        }
        Ok((response, false))
    }

    fn fallback(&self, started: Instant, reason: String) -> LlmReply {
        LlmReply {
            path: LlmPath::Ack,
            text: self.settings.ack_fallback_text.clone(),
            tool_calls: Vec::new(),
            usage: None,
            cached: false,
            outcome: Outcome::Degraded,
            degraded_reason: Some(reason),
            duration_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Hash of the inputs that decide a response: model, messages, tool names,
/// sampling settings.
fn cache_key(request: &ProviderRequest) -> String {
    let tool_names: Vec<&str> = request.tools.iter().map(|t| t.name.as_str()).collect();
    canonical::hash_value(&json!({
        "model": request.model,
        "messages": request.messages,
        "tools": tool_names,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    }))
}

/// Arguments arrive as a JSON string. An empty string means no arguments;
/// anything unparseable becomes `null` and is rejected by the tool.
fn parse_tool_call(call: &MessageToolCall) -> ToolCall {
    let arguments = if call.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&call.arguments).unwrap_or(Value::Null)
    };
    ToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments,
    }
}
