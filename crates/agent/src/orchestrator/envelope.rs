//! Pieces of envelope assembly that don't need the orchestrator.

use crate::context::canonical;
use decisionflow_core::tool::SideEffects;
use decisionflow_core::{
    DecisionStage, ProgressMarker, Route, StageTransition, SuggestedAction, ToolDefinition,
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Name of the pseudo-tool the model uses to propose follow-ups.
pub const SUGGEST_ACTIONS_TOOL: &str = "suggest_next_actions";

/// Most actions kept from the model.
const MAX_MODEL_ACTIONS: usize = 4;

pub fn suggest_actions_definition() -> ToolDefinition {
    ToolDefinition {
        name: SUGGEST_ACTIONS_TOOL.into(),
        description: "Offer the user up to four short follow-up actions.".into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "actions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "label": {"type": "string"},
                            "prompt": {"type": "string"}
                        },
                        "required": ["label", "prompt"]
                    }
                }
            },
            "required": ["actions"]
        }),
    }
}

#[derive(Deserialize)]
struct RawActions {
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    label: String,
    #[serde(default)]
    prompt: Option<String>,
}

/// Actions from a `suggest_next_actions` call. Malformed input yields none.
pub fn parse_suggested_actions(arguments: &Value) -> Vec<SuggestedAction> {
    let Ok(raw) = RawActions::deserialize(arguments) else {
        return Vec::new();
    };
    raw.actions
        .into_iter()
        .filter(|a| !a.label.trim().is_empty())
        .take(MAX_MODEL_ACTIONS)
        .map(|a| {
            let label = a.label.trim().to_string();
            let prompt = a.prompt.unwrap_or_else(|| label.clone());
            SuggestedAction::model(label, prompt)
        })
        .collect()
}

/// Model actions first, rescue actions after; later duplicates by label dropped.
pub fn merge_actions(
    model: Vec<SuggestedAction>,
    rescue: Vec<SuggestedAction>,
) -> Vec<SuggestedAction> {
    let mut merged: Vec<SuggestedAction> = Vec::with_capacity(model.len() + rescue.len());
    for action in model.into_iter().chain(rescue) {
        if !merged
            .iter()
            .any(|a| a.label.eq_ignore_ascii_case(&action.label))
        {
            merged.push(action);
        }
    }
    merged
}

/// Tool text wins over the model's text when any tool produced some.
pub fn final_text(llm_text: &str, tool_texts: &[String]) -> String {
    let tool_texts: Vec<&str> = tool_texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if tool_texts.is_empty() {
        llm_text.trim().to_string()
    } else {
        tool_texts.join("\n\n")
    }
}

/// The stage move a turn's side effects justify, if any.
pub fn stage_transition(stage: DecisionStage, effects: SideEffects) -> Option<StageTransition> {
    use DecisionStage::*;
    let to = if effects.brief_generated && stage == EvaluatePost {
        Decide
    } else if effects.analysis_ran && matches!(stage, Frame | Ideate | EvaluatePre) {
        EvaluatePost
    } else if effects.graph_updated && stage == Frame {
        Ideate
    } else {
        return None;
    };
    Some(StageTransition { from: stage, to })
}

pub fn progress_marker(effects: SideEffects, acknowledged: bool) -> ProgressMarker {
    if effects.brief_generated {
        ProgressMarker::BriefGenerated
    } else if effects.analysis_ran {
        ProgressMarker::AnalysisRan
    } else if effects.graph_updated {
        ProgressMarker::GraphUpdated
    } else if acknowledged {
        ProgressMarker::Acknowledged
    } else {
        ProgressMarker::None
    }
}

/// Semantic inputs of a turn. Turn id, conversation history and any
/// system-event payload are deliberately absent.
#[derive(Debug, Clone, Copy)]
pub struct LineageInput<'a> {
    pub scenario_id: &'a str,
    pub stage: DecisionStage,
    pub intent: &'a str,
    pub route: Route,
    pub prompt_version: &'a str,
    pub brief_hash: &'a str,
    pub config_hash: &'a str,
    pub graph: Option<&'a Value>,
    pub analysis: Option<&'a Value>,
    pub knowledge_version: Option<&'a str>,
}

pub fn lineage_hash(input: &LineageInput<'_>) -> String {
    canonical::hash_value(&json!({
        "scenario_id": input.scenario_id,
        "stage": input.stage,
        "intent": input.intent,
        "route": input.route,
        "prompt_version": input.prompt_version,
        "brief_hash": input.brief_hash,
        "config_hash": input.config_hash,
        "graph_hash": input.graph.map(canonical::hash_value),
        "analysis_hash": input.analysis.map(canonical::hash_value),
        "knowledge_version": input.knowledge_version,
    }))
}

pub fn knowledge_hash(version: Option<&str>) -> Option<String> {
    version.map(|v| canonical::hash_parts(&["knowledge", v]))
}
