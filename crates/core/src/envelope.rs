//! The response envelope produced for every turn.
//!
//! An envelope is always produced, including on internal failure. The
//! [`Outcome`] tag tells the caller whether it got a full answer, a
//! degraded-but-valid one, or an error with a populated [`EnvelopeError`].

use crate::route::{DecisionStage, Route};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result tag for operations whose degraded results are still usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Ok,
    Degraded,
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Degraded => "degraded",
            Outcome::Error => "error",
        }
    }

    /// Combine two outcomes, keeping the worse one.
    pub fn worst(self, other: Outcome) -> Outcome {
        use Outcome::*;
        match (self, other) {
            (Error, _) | (_, Error) => Error,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Ok,
        }
    }
}

/// Structured content attached to a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    GraphPatch { patch: serde_json::Value },
    Analysis { summary: serde_json::Value },
    Brief { markdown: String },
    Commentary { text: String },
    /// Block kinds this crate does not know about, kept verbatim.
    Extension {
        kind: String,
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSource {
    Model,
    Rescue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub label: String,
    pub prompt: String,
    pub source: ActionSource,
}

impl SuggestedAction {
    pub fn model(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
            source: ActionSource::Model,
        }
    }

    pub fn rescue(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
            source: ActionSource::Rescue,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub context_hash: String,
    /// Content-addressed hash over the semantic inputs of the turn.
    pub lineage_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_hash: Option<String>,
    pub prompt_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: DecisionStage,
    pub to: DecisionStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageIndicator {
    pub current: DecisionStage,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<StageTransition>,
}

impl Default for StageIndicator {
    fn default() -> Self {
        Self {
            current: DecisionStage::Frame,
            confidence: 0.0,
            transition: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScienceLedger {
    #[serde(default)]
    pub claims_used: Vec<String>,
    #[serde(default)]
    pub techniques_used: Vec<String>,
    #[serde(default)]
    pub scope_violations: Vec<String>,
    #[serde(default)]
    pub phrasing_violations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMarker {
    #[default]
    None,
    GraphUpdated,
    AnalysisRan,
    BriefGenerated,
    Acknowledged,
}

/// How tool selection was made for this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// A system event mapped 1:1 to a tool.
    Deterministic,
    #[default]
    ModelChosen,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observability {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub routing: RoutingMode,
    /// `ack`, `full`, `cached`, or `none`.
    #[serde(default)]
    pub llm_path: String,
    #[serde(default)]
    pub phase_timings_ms: BTreeMap<String, u64>,
    #[serde(default)]
    pub context_tokens: usize,
    #[serde(default = "default_true")]
    pub within_budget: bool,
    #[serde(default)]
    pub overage_tokens: usize,
    #[serde(default)]
    pub cascade_steps: Vec<String>,
    #[serde(default)]
    pub degraded_reasons: Vec<String>,
    /// Internal diagnostics. Populated only outside production.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    PipelineError,
    Cancelled,
}

impl ErrorCode {
    /// HTTP status the gateway answers with for this code.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 400,
            ErrorCode::PipelineError => 500,
            ErrorCode::Cancelled => 503,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub turn_id: String,
    pub assistant_text: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,
    pub lineage: Lineage,
    pub stage: StageIndicator,
    pub science_ledger: ScienceLedger,
    pub progress: ProgressMarker,
    pub observability: Observability,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl ResponseEnvelope {
    /// An error envelope with a safe, non-revealing assistant message.
    pub fn failure(turn_id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            turn_id: turn_id.into(),
            assistant_text: message.clone(),
            outcome: Outcome::Error,
            error: Some(EnvelopeError { code, message }),
            ..Default::default()
        }
    }

    /// HTTP status for this envelope: 200 unless an error is attached.
    pub fn http_status(&self) -> u16 {
        self.error.as_ref().map_or(200, |e| e.code.http_status())
    }
}
