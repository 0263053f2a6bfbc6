//! Interaction routes and decision stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The small enumerated set of interaction routes a turn can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Chat,
    DraftGraph,
    EditGraph,
    ExplainResults,
    GenerateBrief,
}

impl Route {
    pub const ALL: [Route; 5] = [
        Route::Chat,
        Route::DraftGraph,
        Route::EditGraph,
        Route::ExplainResults,
        Route::GenerateBrief,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Route::Chat => "chat",
            Route::DraftGraph => "draft_graph",
            Route::EditGraph => "edit_graph",
            Route::ExplainResults => "explain_results",
            Route::GenerateBrief => "generate_brief",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown route: {s}"))
    }
}

/// One of the six decision stages a scenario moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    Frame,
    Ideate,
    EvaluatePre,
    EvaluatePost,
    Decide,
    Optimise,
}

impl DecisionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionStage::Frame => "frame",
            DecisionStage::Ideate => "ideate",
            DecisionStage::EvaluatePre => "evaluate_pre",
            DecisionStage::EvaluatePost => "evaluate_post",
            DecisionStage::Decide => "decide",
            DecisionStage::Optimise => "optimise",
        }
    }
}

impl fmt::Display for DecisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
