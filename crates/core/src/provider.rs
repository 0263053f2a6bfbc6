//! Provider trait: the abstraction over LLM backends.
//!
//! The pipeline consumes two call shapes: a plain chat call (no tools) for
//! acknowledgement turns and a tool-enabled chat call for full reasoning
//! turns. Both go through [`Provider::complete`]; the shape is decided by
//! whether [`ProviderRequest::tools`] is empty. Retries and streaming at the
//! HTTP level are the provider's own business.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,

    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call. Empty for the plain chat shape.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Per-request deadline the transport should honour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_temperature() -> f32 {
    0.2
}

impl ProviderRequest {
    /// A plain chat call with no tool access.
    pub fn chat(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
            timeout_ms: None,
        }
    }

    /// A chat call that may invoke the given tools.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn is_tool_enabled(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider.
///
/// Known fields are typed; anything provider-specific lands in
/// `extensions` so consumers match on keys instead of guessing shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message: Message,

    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_has_no_tools() {
        let req = ProviderRequest::chat("gpt-4o-mini", vec![Message::user("hi")]);
        assert!(!req.is_tool_enabled());
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn tool_enabled_request() {
        let req = ProviderRequest::chat("gpt-4o-mini", vec![]).with_tools(vec![ToolDefinition {
            name: "run_analysis".into(),
            description: "Run the analysis".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]);
        assert!(req.is_tool_enabled());
    }

    #[test]
    fn response_extensions_skip_when_empty() {
        let resp = ProviderResponse {
            message: Message::assistant("ok"),
            usage: None,
            model: "m".into(),
            extensions: BTreeMap::new(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("extensions"));
    }
}
