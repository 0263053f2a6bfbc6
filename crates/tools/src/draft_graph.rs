//! Draft graph tool. Accepts a model-proposed decision graph after a
//! structural check and hands it back as a replacement patch.

use crate::graph::Graph;
use async_trait::async_trait;
use decisionflow_core::envelope::Block;
use decisionflow_core::error::ToolError;
use decisionflow_core::tool::{SideEffects, Tool, ToolContext, ToolOutcome};

pub struct DraftGraphTool;

#[async_trait]
impl Tool for DraftGraphTool {
    fn name(&self) -> &str {
        "draft_graph"
    }

    fn description(&self) -> &str {
        "Propose a complete decision graph: one goal node, option nodes, factor nodes, and causal edges between them."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "graph": {
                    "type": "object",
                    "properties": {
                        "nodes": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "id": {"type": "string"},
                                    "kind": {"type": "string", "enum": ["goal", "option", "factor", "outcome", "risk"]},
                                    "label": {"type": "string"}
                                },
                                "required": ["id", "kind", "label"]
                            }
                        },
                        "edges": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "id": {"type": "string"},
                                    "from": {"type": "string"},
                                    "to": {"type": "string"},
                                    "strength": {"type": "number"}
                                },
                                "required": ["from", "to"]
                            }
                        }
                    },
                    "required": ["nodes", "edges"]
                },
                "rationale": {
                    "type": "string",
                    "description": "One or two sentences on why the graph is shaped this way"
                }
            },
            "required": ["graph"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutcome, ToolError> {
        let raw = arguments
            .get("graph")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'graph' argument".into()))?;
        let graph = Graph::from_value(raw)?;

        if graph.nodes.is_empty() {
            return Err(ToolError::InvalidArguments("draft graph has no nodes".into()));
        }
        let problems = graph.problems();
        if !problems.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "draft graph is malformed: {}",
                problems.join("; ")
            )));
        }

        let options = graph.count_kind("option");
        let text = format!(
            "I drafted a model with {} nodes ({} option{}) and {} links. Review it and adjust anything that looks off.",
            graph.nodes.len(),
            options,
            if options == 1 { "" } else { "s" },
            graph.edges.len()
        );

        let mut blocks = vec![Block::GraphPatch {
            patch: serde_json::json!({"op": "replace", "graph": graph.to_value()}),
        }];
        if let Some(rationale) = arguments["rationale"].as_str().filter(|r| !r.trim().is_empty()) {
            blocks.push(Block::Commentary {
                text: rationale.trim().to_string(),
            });
        }

        Ok(ToolOutcome {
            success: true,
            text: Some(text),
            blocks,
            side_effects: SideEffects {
                graph_updated: true,
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> serde_json::Value {
        json!({
            "graph": {
                "nodes": [
                    {"id": "goal", "kind": "goal", "label": "Grow revenue"},
                    {"id": "opt_a", "kind": "option", "label": "Raise prices"},
                    {"id": "opt_b", "kind": "option", "label": "New market"}
                ],
                "edges": [
                    {"id": "e1", "from": "opt_a", "to": "goal", "strength": 0.4},
                    {"id": "e2", "from": "opt_b", "to": "goal", "strength": 0.6}
                ]
            },
            "rationale": "Both options feed the goal directly."
        })
    }

    #[tokio::test]
    async fn accepts_well_formed_draft() {
        let outcome = DraftGraphTool
            .execute(&ToolContext::default(), draft())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.side_effects.graph_updated);
        assert!(outcome.text.unwrap().contains("3 nodes (2 options) and 2 links"));
        match &outcome.blocks[0] {
            Block::GraphPatch { patch } => {
                assert_eq!(patch["op"], "replace");
                assert_eq!(patch["graph"]["nodes"][1]["id"], "opt_a");
            }
            other => panic!("unexpected block: {other:?}"),
        }
        assert!(matches!(outcome.blocks[1], Block::Commentary { .. }));
    }

    #[tokio::test]
    async fn rejects_dangling_edges() {
        let mut args = draft();
        args["graph"]["edges"][0]["to"] = json!("nowhere");
        let err = DraftGraphTool
            .execute(&ToolContext::default(), args)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown node 'nowhere'"));
    }

    #[tokio::test]
    async fn rejects_missing_or_empty_graph() {
        let err = DraftGraphTool
            .execute(&ToolContext::default(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = DraftGraphTool
            .execute(&ToolContext::default(), json!({"graph": {"nodes": [], "edges": []}}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no nodes"));
    }
}
