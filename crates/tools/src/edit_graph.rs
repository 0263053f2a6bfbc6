//! Edit graph tool. Applies a list of edit operations to the client's
//! current graph.
//!
//! Operations apply in order and the whole batch fails on the first bad
//! one, so a partially edited graph is never returned.

use crate::graph::{Edge, Graph, Node};
use async_trait::async_trait;
use decisionflow_core::envelope::Block;
use decisionflow_core::error::ToolError;
use decisionflow_core::tool::{SideEffects, Tool, ToolContext, ToolOutcome};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    AddNode {
        id: String,
        kind: String,
        #[serde(default)]
        label: Option<String>,
    },
    RemoveNode {
        id: String,
    },
    AddEdge {
        #[serde(default)]
        id: Option<String>,
        from: String,
        to: String,
        #[serde(default)]
        strength: Option<f64>,
    },
    RemoveEdge {
        id: String,
    },
    SetStrength {
        edge_id: String,
        strength: f64,
    },
}

impl EditOp {
    /// Apply to `graph`, returning a short description of the change.
    pub fn apply(&self, graph: &mut Graph) -> Result<String, ToolError> {
        match self {
            EditOp::AddNode { id, kind, label } => {
                if graph.node(id).is_some() {
                    return Err(invalid(format!("node '{id}' already exists")));
                }
                graph.nodes.push(Node {
                    id: id.clone(),
                    kind: Some(kind.clone()),
                    label: label.clone(),
                    extra: Default::default(),
                });
                Ok(format!("added {kind} '{id}'"))
            }
            EditOp::RemoveNode { id } => {
                let before = graph.nodes.len();
                graph.nodes.retain(|n| &n.id != id);
                if graph.nodes.len() == before {
                    return Err(invalid(format!("unknown node '{id}'")));
                }
                let edges_before = graph.edges.len();
                graph.edges.retain(|e| &e.from != id && &e.to != id);
                let dropped = edges_before - graph.edges.len();
                Ok(if dropped == 0 {
                    format!("removed '{id}'")
                } else {
                    format!("removed '{id}' and {dropped} attached link(s)")
                })
            }
            EditOp::AddEdge {
                id,
                from,
                to,
                strength,
            } => {
                for end in [from, to] {
                    if graph.node(end).is_none() {
                        return Err(invalid(format!("unknown node '{end}'")));
                    }
                }
                if from == to {
                    return Err(invalid(format!("edge on '{from}' points at itself")));
                }
                let id = id
                    .clone()
                    .unwrap_or_else(|| next_edge_id(graph));
                if graph.edge_position(&id).is_some() {
                    return Err(invalid(format!("edge '{id}' already exists")));
                }
                graph.edges.push(Edge {
                    id: Some(id.clone()),
                    from: from.clone(),
                    to: to.clone(),
                    strength: strength.map(|s| serde_json::json!(s)),
                    extra: Default::default(),
                });
                Ok(format!("linked '{from}' to '{to}' as {id}"))
            }
            EditOp::RemoveEdge { id } => {
                let pos = graph
                    .edge_position(id)
                    .ok_or_else(|| invalid(format!("unknown edge '{id}'")))?;
                graph.edges.remove(pos);
                Ok(format!("removed link {id}"))
            }
            EditOp::SetStrength { edge_id, strength } => {
                if !(-1.0..=1.0).contains(strength) {
                    return Err(invalid(format!(
                        "strength {strength} for '{edge_id}' is outside [-1, 1]"
                    )));
                }
                let pos = graph
                    .edge_position(edge_id)
                    .ok_or_else(|| invalid(format!("unknown edge '{edge_id}'")))?;
                graph.edges[pos].strength = Some(serde_json::json!(strength));
                Ok(format!("set {edge_id} strength to {strength}"))
            }
        }
    }
}

fn invalid(reason: String) -> ToolError {
    ToolError::InvalidArguments(reason)
}

/// First `e{n}` not already taken.
fn next_edge_id(graph: &Graph) -> String {
    (graph.edges.len()..)
        .map(|n| format!("e{n}"))
        .find(|candidate| graph.edge_position(candidate).is_none())
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct EditArgs {
    operations: Vec<EditOp>,
}

pub struct EditGraphTool;

#[async_trait]
impl Tool for EditGraphTool {
    fn name(&self) -> &str {
        "edit_graph"
    }

    fn description(&self) -> &str {
        "Change the current decision graph: add or remove nodes and edges, or set an edge's strength."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "op": {
                                "type": "string",
                                "enum": ["add_node", "remove_node", "add_edge", "remove_edge", "set_strength"]
                            },
                            "id": {"type": "string"},
                            "kind": {"type": "string"},
                            "label": {"type": "string"},
                            "from": {"type": "string"},
                            "to": {"type": "string"},
                            "edge_id": {"type": "string"},
                            "strength": {"type": "number", "minimum": -1, "maximum": 1}
                        },
                        "required": ["op"]
                    }
                }
            },
            "required": ["operations"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutcome, ToolError> {
        let args = EditArgs::deserialize(&arguments)
            .map_err(|e| invalid(format!("unreadable operations: {e}")))?;
        if args.operations.is_empty() {
            return Err(invalid("no operations given".into()));
        }

        let mut graph = match &ctx.graph {
            Some(raw) => Graph::from_value(raw)?,
            None => Graph::default(),
        };

        let changes = args
            .operations
            .iter()
            .map(|op| op.apply(&mut graph))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            scenario_id = %ctx.scenario_id,
            operations = changes.len(),
            "Applied graph edits"
        );

        let text = match changes.as_slice() {
            [one] => format!("Done: {one}."),
            many => format!("Applied {} changes: {}.", many.len(), many.join(", ")),
        };

        Ok(ToolOutcome {
            success: true,
            text: Some(text),
            blocks: vec![Block::GraphPatch {
                patch: serde_json::json!({
                    "op": "edit",
                    "operations": arguments["operations"],
                    "graph": graph.to_value(),
                }),
            }],
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

    fn ctx() -> ToolContext {
        ToolContext {
            scenario_id: "s1".into(),
            graph: Some(json!({
                "nodes": [
                    {"id": "goal", "kind": "goal", "label": "Grow"},
                    {"id": "opt_a", "kind": "option", "label": "Raise prices"},
                    {"id": "churn", "kind": "factor", "label": "Churn"}
                ],
                "edges": [
                    {"id": "e0", "from": "opt_a", "to": "churn", "strength": 0.3},
                    {"id": "e1", "from": "churn", "to": "goal", "strength": -0.5}
                ]
            })),
            ..Default::default()
        }
    }

    fn patched_graph(outcome: &ToolOutcome) -> Graph {
        match &outcome.blocks[0] {
            Block::GraphPatch { patch } => Graph::from_value(&patch["graph"]).unwrap(),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[tokio::test]
    async fn applies_operations_in_order() {
        let outcome = EditGraphTool
            .execute(
                &ctx(),
                json!({"operations": [
                    {"op": "add_node", "id": "opt_b", "kind": "option", "label": "New market"},
                    {"op": "add_edge", "from": "opt_b", "to": "goal", "strength": 0.4},
                    {"op": "set_strength", "edge_id": "e0", "strength": 0.8}
                ]}),
            )
            .await
            .unwrap();
        assert!(outcome.side_effects.graph_updated);
        assert!(outcome.text.as_ref().unwrap().starts_with("Applied 3 changes"));

        let graph = patched_graph(&outcome);
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges[2].id.as_deref(), Some("e2"));
        assert_eq!(graph.edges[0].strength, Some(json!(0.8)));
    }

    #[tokio::test]
    async fn removing_a_node_drops_its_edges() {
        let outcome = EditGraphTool
            .execute(&ctx(), json!({"operations": [{"op": "remove_node", "id": "churn"}]}))
            .await
            .unwrap();
        assert_eq!(outcome.text.as_deref(), Some("Done: removed 'churn' and 2 attached link(s)."));
        assert!(patched_graph(&outcome).edges.is_empty());
    }

    #[tokio::test]
    async fn bad_operation_fails_whole_batch() {
        let err = EditGraphTool
            .execute(
                &ctx(),
                json!({"operations": [
                    {"op": "remove_edge", "id": "e0"},
                    {"op": "remove_edge", "id": "e9"}
                ]}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown edge 'e9'"));
    }

    #[tokio::test]
    async fn strength_out_of_range_rejected() {
        let err = EditGraphTool
            .execute(
                &ctx(),
                json!({"operations": [{"op": "set_strength", "edge_id": "e0", "strength": 1.5}]}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn edits_start_from_empty_graph_when_none_sent() {
        let outcome = EditGraphTool
            .execute(
                &ToolContext::default(),
                json!({"operations": [{"op": "add_node", "id": "goal", "kind": "goal"}]}),
            )
            .await
            .unwrap();
        assert_eq!(patched_graph(&outcome).nodes.len(), 1);
    }

    #[tokio::test]
    async fn unknown_op_is_invalid() {
        let err = EditGraphTool
            .execute(&ctx(), json!({"operations": [{"op": "explode"}]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unreadable operations"));
    }
}
