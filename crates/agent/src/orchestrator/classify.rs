//! Turn classification: acknowledgement vs full turn, route, intent.

use decisionflow_core::request::{SystemEventKind, TurnRequest};
use decisionflow_core::{RoutingMode, Route};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// A system event that only needs a short confirmation.
    Acknowledge,
    /// A conversational turn with reasoning and tool access.
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: TurnKind,
    pub route: Route,
    pub intent: String,
    pub routing: RoutingMode,
    /// Tool a system event maps to 1:1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_tool: Option<String>,
}

// Checked in order; the first route with a matching keyword wins.
const KEYWORDS: &[(Route, &[&str])] = &[
    (
        Route::GenerateBrief,
        &["brief", "write up", "write-up", "summary report", "executive summary"],
    ),
    (
        Route::DraftGraph,
        &["draft", "build a model", "create a model", "new model", "start a graph", "map out"],
    ),
    (
        Route::EditGraph,
        &["add ", "remove ", "delete ", "rename", "connect ", "change the", "set the strength", "edit "],
    ),
    (
        Route::ExplainResults,
        &["why", "explain", "results", "sensitiv", "robust", "margin", "winning", "which option"],
    ),
];

/// Pick a route for a conversational message.
pub fn route_for_message(message: &str) -> Route {
    let lowered = message.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map(|(route, _)| *route)
        .unwrap_or(Route::Chat)
}

pub fn classify(request: &TurnRequest) -> Classification {
    if let Some(event) = &request.system_event {
        let (route, forced_tool) = match event.kind {
            SystemEventKind::RunAnalysis => (Route::ExplainResults, Some("run_analysis")),
            SystemEventKind::GenerateBrief => (Route::GenerateBrief, Some("generate_brief")),
            SystemEventKind::GraphEdited
            | SystemEventKind::PatchAccepted
            | SystemEventKind::PatchDismissed => (Route::EditGraph, None),
            SystemEventKind::Feedback => (Route::Chat, None),
        };
        return Classification {
            kind: TurnKind::Acknowledge,
            route: request.route.unwrap_or(route),
            intent: format!("system_event:{}", event.kind.as_str()),
            routing: if forced_tool.is_some() {
                RoutingMode::Deterministic
            } else {
                RoutingMode::ModelChosen
            },
            forced_tool: forced_tool.map(str::to_string),
        };
    }

    let route = request
        .route
        .unwrap_or_else(|| route_for_message(&request.message));
    Classification {
        kind: TurnKind::Full,
        route,
        intent: route.as_str().to_string(),
        routing: RoutingMode::ModelChosen,
        forced_tool: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decisionflow_core::request::SystemEvent;

    fn event(kind: SystemEventKind) -> TurnRequest {
        let mut req = TurnRequest::new("s1", "t1", "");
        req.system_event = Some(SystemEvent {
            kind,
            payload: serde_json::json!({}),
        });
        req
    }

    #[test]
    fn patch_accepted_is_ack_only() {
        let c = classify(&event(SystemEventKind::PatchAccepted));
        assert_eq!(c.kind, TurnKind::Acknowledge);
        assert_eq!(c.route, Route::EditGraph);
        assert_eq!(c.intent, "system_event:patch_accepted");
        assert!(c.forced_tool.is_none());
        assert_eq!(c.routing, RoutingMode::ModelChosen);
    }

    #[test]
    fn run_analysis_is_deterministic() {
        let c = classify(&event(SystemEventKind::RunAnalysis));
        assert_eq!(c.forced_tool.as_deref(), Some("run_analysis"));
        assert_eq!(c.routing, RoutingMode::Deterministic);
    }

    #[test]
    fn keyword_routes() {
        assert_eq!(route_for_message("Can you draft a model for hiring?"), Route::DraftGraph);
        assert_eq!(route_for_message("Add a node for churn"), Route::EditGraph);
        assert_eq!(route_for_message("Why is option A winning?"), Route::ExplainResults);
        assert_eq!(route_for_message("Write up a brief for the board"), Route::GenerateBrief);
        assert_eq!(route_for_message("hello there"), Route::Chat);
    }

    #[test]
    fn explicit_route_wins() {
        let mut req = TurnRequest::new("s1", "t1", "why is A winning?");
        req.route = Some(Route::Chat);
        let c = classify(&req);
        assert_eq!(c.kind, TurnKind::Full);
        assert_eq!(c.route, Route::Chat);
    }
}
