//! The Decision State: a plain snapshot of graph, analysis, and
//! conversation facts for a single turn.
//!
//! Numeric fields shown to the model travel together with the fact id they
//! came from. Truncation removes whole records, never half of one.

use crate::route::DecisionStage;
use serde::{Deserialize, Serialize};

/// A value paired with the optional fact id it originated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cited<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
}

impl<T> Cited<T> {
    pub fn new(value: T, fact_id: Option<String>) -> Self {
        Self { value, fact_id }
    }
}

/// A compact causal-edge digest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub option_ids: Vec<String>,
    #[serde(default)]
    pub edges: Vec<CausalEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winner {
    pub option_id: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobustnessLevel {
    High,
    Medium,
    Low,
}

impl RobustnessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RobustnessLevel::High => "high",
            RobustnessLevel::Medium => "medium",
            RobustnessLevel::Low => "low",
        }
    }
}

/// A top sensitivity driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub node_id: String,
    pub sensitivity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragileEdge {
    pub edge_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Cited<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robustness: Option<RobustnessLevel>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(default)]
    pub fragile_edges: Vec<FragileEdge>,
}

impl AnalysisSummary {
    /// All fact ids currently carried by the summary.
    pub fn fact_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        if let Some(id) = self.winner.as_ref().and_then(|w| w.fact_id.as_deref()) {
            ids.push(id);
        }
        if let Some(id) = self.margin.as_ref().and_then(|m| m.fact_id.as_deref()) {
            ids.push(id);
        }
        ids.extend(self.drivers.iter().filter_map(|d| d.fact_id.as_deref()));
        ids.extend(self.fragile_edges.iter().filter_map(|e| e.fact_id.as_deref()));
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.winner.is_none()
            && self.margin.is_none()
            && self.robustness.is_none()
            && self.drivers.is_empty()
            && self.fragile_edges.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Framing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<DecisionStage>,
}

/// A causal claim the user asserted in conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserClaim {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

/// Snapshot handed to the zone renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisSummary>,
    #[serde(default)]
    pub framing: Framing,
    #[serde(default)]
    pub user_claims: Vec<UserClaim>,
    #[serde(default)]
    pub unresolved_questions: Vec<String>,
    /// Raw producer-side summary text. Never rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_summary: Option<String>,
}
