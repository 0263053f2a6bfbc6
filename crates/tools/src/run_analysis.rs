//! Run analysis tool. Delegates to the configured analysis engine.

use async_trait::async_trait;
use decisionflow_core::AnalysisEngine;
use decisionflow_core::envelope::Block;
use decisionflow_core::error::ToolError;
use decisionflow_core::tool::{SideEffects, Tool, ToolContext, ToolOutcome};
use std::sync::Arc;

pub struct RunAnalysisTool {
    engine: Option<Arc<dyn AnalysisEngine>>,
}

impl RunAnalysisTool {
    pub fn new(engine: Option<Arc<dyn AnalysisEngine>>) -> Self {
        Self { engine }
    }
}

/// One-line summary of an engine response. Missing fields are skipped.
fn headline(result: &serde_json::Value) -> String {
    let winner = &result["winner"];
    let Some(option_id) = winner["option_id"].as_str() else {
        return "Analysis complete.".to_string();
    };

    let mut line = match winner["probability"].as_f64() {
        Some(p) => format!(
            "Analysis complete. '{option_id}' comes out ahead with a {:.0}% chance of being best",
            p * 100.0
        ),
        None => format!("Analysis complete. '{option_id}' comes out ahead"),
    };
    if let Some(level) = result["robustness"].as_str() {
        line.push_str(&format!(" (robustness: {level})"));
    }
    line.push('.');
    line
}

#[async_trait]
impl Tool for RunAnalysisTool {
    fn name(&self) -> &str {
        "run_analysis"
    }

    fn description(&self) -> &str {
        "Run the probabilistic analysis on the current decision graph and report which option leads."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": true
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolOutcome, ToolError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| ToolError::NotConfigured("no analysis engine configured".into()))?;

        // An explicit graph in the arguments wins over the one on the turn.
        let graph = arguments
            .get("graph")
            .filter(|g| g.is_object())
            .or(ctx.graph.as_ref())
            .ok_or_else(|| ToolError::InvalidArguments("there is no graph to analyse yet".into()))?;

        let result = engine.analyse(&ctx.scenario_id, graph, ctx.seed).await?;
        tracing::info!(scenario_id = %ctx.scenario_id, seed = ctx.seed, "Analysis ran");

        Ok(ToolOutcome {
            success: true,
            text: Some(headline(&result)),
            blocks: vec![Block::Analysis { summary: result }],
            side_effects: SideEffects {
                analysis_ran: true,
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
    use std::sync::Mutex;

    /// Records what it was asked and returns a fixed result.
    struct MockEngine {
        seen: Mutex<Vec<(String, u64)>>,
        result: Result<serde_json::Value, ToolError>,
    }

    impl MockEngine {
        fn returning(result: serde_json::Value) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                result: Ok(result),
            }
        }
    }

    #[async_trait]
    impl AnalysisEngine for MockEngine {
        async fn analyse(
            &self,
            scenario_id: &str,
            _graph: &serde_json::Value,
            seed: u64,
        ) -> Result<serde_json::Value, ToolError> {
            self.seen.lock().unwrap().push((scenario_id.to_string(), seed));
            self.result.clone()
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            scenario_id: "s1".into(),
            graph: Some(json!({"nodes": [{"id": "g", "kind": "goal"}], "edges": []})),
            seed: 99,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn runs_engine_with_turn_seed() {
        let engine = Arc::new(MockEngine::returning(json!({
            "winner": {"option_id": "opt_a", "probability": 0.62, "fact_id": "f_win"},
            "robustness": "medium"
        })));
        let tool = RunAnalysisTool::new(Some(engine.clone()));
        let outcome = tool.execute(&ctx(), json!({})).await.unwrap();

        assert!(outcome.side_effects.analysis_ran);
        assert_eq!(
            outcome.text.as_deref(),
            Some("Analysis complete. 'opt_a' comes out ahead with a 62% chance of being best (robustness: medium).")
        );
        assert!(matches!(outcome.blocks[0], Block::Analysis { .. }));
        assert_eq!(engine.seen.lock().unwrap()[0], ("s1".to_string(), 99));
    }

    #[tokio::test]
    async fn missing_engine_is_not_configured() {
        let err = RunAnalysisTool::new(None)
            .execute(&ctx(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn no_graph_is_invalid() {
        let tool = RunAnalysisTool::new(Some(Arc::new(MockEngine::returning(json!({})))));
        let err = tool
            .execute(&ToolContext::default(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn engine_failure_propagates() {
        let engine = MockEngine {
            seen: Mutex::new(Vec::new()),
            result: Err(ToolError::ExecutionFailed {
                tool_name: "run_analysis".into(),
                reason: "engine returned 500".into(),
            }),
        };
        let err = RunAnalysisTool::new(Some(Arc::new(engine)))
            .execute(&ctx(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[test]
    fn headline_without_winner() {
        assert_eq!(headline(&json!({})), "Analysis complete.");
    }
}
