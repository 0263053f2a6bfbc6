//! Tool trait: the side-effecting capabilities a turn can invoke.
//!
//! Tools run in the `execute_tools` phase after the LLM (or a system event)
//! asked for them. Each returns optional text, content blocks, and the side
//! effects it caused; the envelope assembler uses those to pick the
//! progress marker and any stage transition.

use crate::envelope::Block;
use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::state::DecisionState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// What a tool changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffects {
    pub graph_updated: bool,
    pub analysis_ran: bool,
    pub brief_generated: bool,
}

impl SideEffects {
    pub fn merge(&mut self, other: SideEffects) {
        self.graph_updated |= other.graph_updated;
        self.analysis_ran |= other.analysis_ran;
        self.brief_generated |= other.brief_generated;
    }

    pub fn any(&self) -> bool {
        self.graph_updated || self.analysis_ran || self.brief_generated
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The call ID this result is for
    pub call_id: String,

    pub success: bool,

    /// User-facing text. Takes precedence over the model's text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default)]
    pub blocks: Vec<Block>,

    #[serde(default)]
    pub side_effects: SideEffects,
}

/// Read-only inputs a tool sees.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub scenario_id: String,
    pub state: DecisionState,
    /// The raw client graph, if one was sent.
    pub graph: Option<serde_json::Value>,
    pub seed: u64,
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "run_analysis").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Ordered by name so definitions sent to the LLM are stable across runs.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call. The returned outcome carries the call's id.
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        call: &ToolCall,
    ) -> std::result::Result<ToolOutcome, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let mut outcome = tool.execute(ctx, call.arguments.clone()).await?;
        outcome.call_id = call.id.clone();
        Ok(outcome)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MarkTool;

    #[async_trait]
    impl Tool for MarkTool {
        fn name(&self) -> &str {
            "mark"
        }
        fn description(&self) -> &str {
            "Marks the graph as updated"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "note": { "type": "string" } }
            })
        }
        async fn execute(
            &self,
            ctx: &ToolContext,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            let note = arguments["note"].as_str().unwrap_or("");
            Ok(ToolOutcome {
                success: true,
                text: Some(format!("{}: {note}", ctx.scenario_id)),
                side_effects: SideEffects {
                    graph_updated: true,
                    ..Default::default()
                },
                ..Default::default()
            })
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MarkTool));
        assert!(registry.get("mark").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.definitions()[0].name, "mark");
    }

    #[tokio::test]
    async fn registry_execute_sets_call_id() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(MarkTool));

        let ctx = ToolContext {
            scenario_id: "s1".into(),
            ..Default::default()
        };
        let call = ToolCall {
            id: "call_1".into(),
            name: "mark".into(),
            arguments: serde_json::json!({"note": "done"}),
        };
        let outcome = registry.execute(&ctx, &call).await.unwrap();
        assert_eq!(outcome.call_id, "call_1");
        assert_eq!(outcome.text.as_deref(), Some("s1: done"));
        assert!(outcome.side_effects.graph_updated);
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry
            .execute(&ToolContext::default(), &call)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn side_effects_merge() {
        let mut a = SideEffects::default();
        assert!(!a.any());
        a.merge(SideEffects {
            analysis_ran: true,
            ..Default::default()
        });
        assert!(a.analysis_ran && a.any());
    }
}
