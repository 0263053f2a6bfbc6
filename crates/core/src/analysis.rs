//! Analysis engine collaborator.

use crate::error::ToolError;
use async_trait::async_trait;

/// Runs a probabilistic analysis over a decision graph.
///
/// The response is the engine's raw JSON; the orchestrator's state builder
/// reads winner, margin, robustness, drivers, and fragile edges out of it.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn analyse(
        &self,
        scenario_id: &str,
        graph: &serde_json::Value,
        seed: u64,
    ) -> Result<serde_json::Value, ToolError>;
}
