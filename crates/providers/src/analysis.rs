//! HTTP client for the analysis engine.
//!
//! The engine is an external service: it receives the graph and a seed and
//! returns its raw analysis JSON. The same seed for the same scenario keeps
//! repeated runs reproducible.

use async_trait::async_trait;
use decisionflow_core::AnalysisEngine;
use decisionflow_core::error::ToolError;
use std::time::Duration;
use tracing::{debug, warn};

const TOOL_NAME: &str = "run_analysis";

pub struct HttpAnalysisEngine {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpAnalysisEngine {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_millis(timeout_ms),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AnalysisEngine for HttpAnalysisEngine {
    async fn analyse(
        &self,
        scenario_id: &str,
        graph: &serde_json::Value,
        seed: u64,
    ) -> Result<serde_json::Value, ToolError> {
        debug!(scenario_id, seed, url = %self.url, "Requesting analysis");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "scenario_id": scenario_id,
                "graph": graph,
                "seed": seed,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Self::failed(format!("timed out after {}ms", self.timeout.as_millis()))
                } else {
                    Self::failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Analysis engine returned error");
            return Err(Self::failed(format!("engine returned {}", status.as_u16())));
        }

        response
            .json()
            .await
            .map_err(|e| Self::failed(format!("unreadable engine response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_graph_and_seed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/analyse"))
            .and(body_partial_json(json!({"scenario_id": "s1", "seed": 42})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "winner": {"option_id": "o1", "value": 0.62, "fact_id": "f_win"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = HttpAnalysisEngine::new(format!("{}/v1/analyse", server.uri()), 1_000);
        let result = engine
            .analyse("s1", &json!({"nodes": [], "edges": []}), 42)
            .await
            .unwrap();
        assert_eq!(result["winner"]["option_id"], "o1");
    }

    #[tokio::test]
    async fn engine_errors_become_tool_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let engine = HttpAnalysisEngine::new(server.uri(), 1_000);
        let err = engine.analyse("s1", &json!({}), 1).await.unwrap_err();
        match err {
            ToolError::ExecutionFailed { tool_name, reason } => {
                assert_eq!(tool_name, "run_analysis");
                assert!(reason.contains("500"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({})),
            )
            .mount(&server)
            .await;

        let engine = HttpAnalysisEngine::new(server.uri(), 50);
        let err = engine.analyse("s1", &json!({}), 1).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
