//! Inbound turn request.

use crate::message::ConversationTurn;
use crate::route::Route;
use crate::state::{Framing, UserClaim};
use serde::{Deserialize, Serialize};

/// Client-supplied context for a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_response: Option<serde_json::Value>,
    #[serde(default)]
    pub framing: Framing,
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_claims: Vec<UserClaim>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_questions: Vec<String>,
    /// Producer-side free-text summary of recent events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    GraphEdited,
    PatchAccepted,
    PatchDismissed,
    RunAnalysis,
    GenerateBrief,
    Feedback,
}

impl SystemEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemEventKind::GraphEdited => "graph_edited",
            SystemEventKind::PatchAccepted => "patch_accepted",
            SystemEventKind::PatchDismissed => "patch_dismissed",
            SystemEventKind::RunAnalysis => "run_analysis",
            SystemEventKind::GenerateBrief => "generate_brief",
            SystemEventKind::Feedback => "feedback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(rename = "type")]
    pub kind: SystemEventKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: TurnContext,
    pub scenario_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_event: Option<SystemEvent>,
    /// Idempotency key.
    pub client_turn_id: String,
    /// Explicit route hint. Overrides keyword classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default)]
    pub selected_elements: Vec<String>,
    #[serde(default)]
    pub clarification_answers: Vec<ClarificationAnswer>,
}

impl TurnRequest {
    pub fn new(
        scenario_id: impl Into<String>,
        client_turn_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            context: TurnContext::default(),
            scenario_id: scenario_id.into(),
            system_event: None,
            client_turn_id: client_turn_id.into(),
            route: None,
            selected_elements: Vec::new(),
            clarification_answers: Vec::new(),
        }
    }

    /// Basic shape checks before the pipeline runs.
    pub fn validate(&self) -> Result<(), String> {
        if self.scenario_id.trim().is_empty() {
            return Err("scenario_id must not be empty".into());
        }
        if self.client_turn_id.trim().is_empty() {
            return Err("client_turn_id must not be empty".into());
        }
        if self.system_event.is_none() && self.message.trim().is_empty() {
            return Err("message must not be empty unless a system_event is present".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_request() {
        let req: TurnRequest = serde_json::from_str(
            r#"{"message":"hi","scenario_id":"s1","client_turn_id":"t1"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert!(req.context.messages.is_empty());
    }

    #[test]
    fn parses_system_event() {
        let req: TurnRequest = serde_json::from_str(
            r#"{"scenario_id":"s1","client_turn_id":"t1",
                "system_event":{"type":"patch_accepted","payload":{"patch_id":"p1"}}}"#,
        )
        .unwrap();
        let event = req.system_event.as_ref().unwrap();
        assert_eq!(event.kind, SystemEventKind::PatchAccepted);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_message_without_event_is_invalid() {
        let req = TurnRequest::new("s1", "t1", "  ");
        assert!(req.validate().is_err());
    }
}
