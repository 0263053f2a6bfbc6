//! Builds a [`DecisionState`] from the client's graph and analysis JSON,
//! and infers the decision stage.
//!
//! Graph shape: `{"nodes": [{"id", "kind", "label"}], "edges": [{"id", "from", "to", "strength"}]}`.
//! Node labels are free text and never reach the canonical state.
//! Malformed input degrades to an absent summary plus a recorded reason.

use decisionflow_core::request::TurnContext;
use decisionflow_core::state::{
    AnalysisSummary, CausalEdge, Cited, DecisionState, Driver, FragileEdge, GraphSummary,
    RobustnessLevel, Winner,
};
use decisionflow_core::DecisionStage;
use serde::Deserialize;
use serde_json::Value;

/// Cap on rendered sensitivity drivers.
const MAX_DRIVERS: usize = 8;

pub const EXPLICIT_STAGE_CONFIDENCE: f64 = 1.0;
pub const INFERRED_STAGE_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Default)]
pub struct BuiltState {
    pub state: DecisionState,
    pub degraded_reasons: Vec<String>,
}

pub fn build_state(context: &TurnContext) -> BuiltState {
    let mut degraded_reasons = Vec::new();

    let graph = context.graph.as_ref().and_then(|raw| match graph_summary(raw) {
        Ok(summary) => Some(summary),
        Err(reason) => {
            tracing::warn!(%reason, "Ignoring malformed graph");
            degraded_reasons.push(format!("graph_unreadable: {reason}"));
            None
        }
    });

    let analysis = context
        .analysis_response
        .as_ref()
        .and_then(|raw| match analysis_summary(raw) {
            Ok(summary) => Some(summary),
            Err(reason) => {
                tracing::warn!(%reason, "Ignoring malformed analysis response");
                degraded_reasons.push(format!("analysis_unreadable: {reason}"));
                None
            }
        });

    BuiltState {
        state: DecisionState {
            graph,
            analysis,
            framing: context.framing.clone(),
            user_claims: context.user_claims.clone(),
            unresolved_questions: context.unresolved_questions.clone(),
            event_summary: context.event_summary.clone(),
        },
        degraded_reasons,
    }
}

/// The stage to use for this turn and how sure we are of it.
pub fn infer_stage(state: &DecisionState) -> (DecisionStage, f64) {
    if let Some(stage) = state.framing.stage {
        return (stage, EXPLICIT_STAGE_CONFIDENCE);
    }
    let stage = match (&state.graph, &state.analysis) {
        (None, _) => DecisionStage::Frame,
        (Some(g), _) if g.option_ids.len() < 2 => DecisionStage::Ideate,
        (Some(_), None) => DecisionStage::EvaluatePre,
        (Some(_), Some(_)) => DecisionStage::EvaluatePost,
    };
    (stage, INFERRED_STAGE_CONFIDENCE)
}

// ── Graph ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawGraph {
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<RawEdge>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct RawEdge {
    #[serde(default)]
    id: Option<String>,
    from: String,
    to: String,
    #[serde(default)]
    strength: Option<Value>,
}

pub fn graph_summary(raw: &Value) -> Result<GraphSummary, String> {
    let graph = RawGraph::deserialize(raw).map_err(|e| e.to_string())?;
    let goal_id = graph
        .nodes
        .iter()
        .find(|n| n.kind.as_deref() == Some("goal"))
        .map(|n| n.id.clone());
    let option_ids = graph
        .nodes
        .iter()
        .filter(|n| n.kind.as_deref() == Some("option"))
        .map(|n| n.id.clone())
        .collect();
    let edges = graph
        .edges
        .iter()
        .enumerate()
        .map(|(i, e)| CausalEdge {
            id: e.id.clone().unwrap_or_else(|| format!("e{i}")),
            from: e.from.clone(),
            to: e.to.clone(),
            strength: e.strength.as_ref().and_then(strength_value),
        })
        .collect();
    Ok(GraphSummary {
        node_count: graph.nodes.len(),
        edge_count: graph.edges.len(),
        goal_id,
        option_ids,
        edges,
    })
}

/// Strength is a bare number or `{"mean": n}`.
fn strength_value(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.get("mean").and_then(Value::as_f64))
}

// ── Analysis ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    winner: Option<Winner>,
    #[serde(default)]
    margin: Option<RawCited>,
    #[serde(default)]
    robustness: Option<RobustnessLevel>,
    #[serde(default)]
    drivers: Vec<Driver>,
    #[serde(default)]
    fragile_edges: Vec<RawFragileEdge>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCited {
    Bare(f64),
    Cited {
        value: f64,
        #[serde(default)]
        fact_id: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFragileEdge {
    Id(String),
    Full(FragileEdge),
}

pub fn analysis_summary(raw: &Value) -> Result<AnalysisSummary, String> {
    let analysis = RawAnalysis::deserialize(raw).map_err(|e| e.to_string())?;
    let mut drivers = analysis.drivers;
    drivers.sort_by(|a, b| b.sensitivity.total_cmp(&a.sensitivity));
    drivers.truncate(MAX_DRIVERS);
    Ok(AnalysisSummary {
        winner: analysis.winner,
        margin: analysis.margin.map(|m| match m {
            RawCited::Bare(value) => Cited::new(value, None),
            RawCited::Cited { value, fact_id } => Cited::new(value, fact_id),
        }),
        robustness: analysis.robustness,
        drivers,
        fragile_edges: analysis
            .fragile_edges
            .into_iter()
            .map(|e| match e {
                RawFragileEdge::Id(edge_id) => FragileEdge {
                    edge_id,
                    fact_id: None,
                },
                RawFragileEdge::Full(edge) => edge,
            })
            .collect(),
    })
}
