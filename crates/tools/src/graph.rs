//! The client's decision graph as the tools read and write it.
//!
//! Shape: `{"nodes": [{"id", "kind", "label"}], "edges": [{"id", "from", "to", "strength"}]}`.
//! Unknown fields on the graph, nodes, and edges are carried through
//! untouched so a round trip through a tool never loses client data.

use decisionflow_core::error::ToolError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Graph {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ToolError> {
        Graph::deserialize(value)
            .map_err(|e| ToolError::InvalidArguments(format!("unreadable graph: {e}")))
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge_position(&self, id: &str) -> Option<usize> {
        self.edges.iter().position(|e| e.id.as_deref() == Some(id))
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.kind.as_deref() == Some(kind))
            .count()
    }

    /// Structural problems, in discovery order. Empty means well formed.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                problems.push("node with empty id".to_string());
            } else if !node_ids.insert(node.id.as_str()) {
                problems.push(format!("duplicate node id '{}'", node.id));
            }
        }

        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if let Some(id) = &edge.id
                && !edge_ids.insert(id.as_str())
            {
                problems.push(format!("duplicate edge id '{id}'"));
            }
            for end in [&edge.from, &edge.to] {
                if !node_ids.contains(end.as_str()) {
                    problems.push(format!(
                        "edge {}->{} references unknown node '{end}'",
                        edge.from, edge.to
                    ));
                }
            }
            if edge.from == edge.to {
                problems.push(format!("edge on '{}' points at itself", edge.from));
            }
        }

        if self.count_kind("goal") > 1 {
            problems.push("more than one goal node".to_string());
        }
        problems
    }
}
