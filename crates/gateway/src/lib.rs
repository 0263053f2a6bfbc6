//! HTTP gateway for decisionflow.
//!
//! A thin axum layer over the turn orchestrator: a health check plus the
//! v1 turn and context endpoints. All turn semantics live in the
//! orchestrator; this crate only maps HTTP in and envelopes out.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use decisionflow_agent::TurnOrchestrator;
use decisionflow_config::AppConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Build the router with all gateway routes.
pub fn build_router(orchestrator: TurnOrchestrator, max_body_bytes: usize) -> Router {
    let api_state = Arc::new(api_v1::ApiV1State { orchestrator });

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(api_state))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the provider, tools, and orchestrator once and serves until the
/// listener fails.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = decisionflow_providers::build_from_config(&config)?;
    let engine = decisionflow_providers::build_analysis_engine(&config);
    if engine.is_none() {
        info!("No analysis engine configured; run_analysis will report itself unavailable");
    }
    let tools = Arc::new(decisionflow_tools::default_registry(engine));
    let orchestrator = TurnOrchestrator::new(provider, tools, &config);

    let app = build_router(orchestrator, config.gateway.max_body_bytes);

    info!(
        addr = %addr,
        provider = %config.llm.provider,
        model = %config.llm.model,
        production = config.orchestrator.production,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use decisionflow_core::error::ProviderError;
    use decisionflow_core::{Message, Provider, ProviderRequest, ProviderResponse};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct QuietProvider;

    #[async_trait]
    impl Provider for QuietProvider {
        fn name(&self) -> &str {
            "quiet"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant("ok"),
                usage: None,
                model: "quiet".into(),
                extensions: Default::default(),
            })
        }
    }

    fn app(max_body_bytes: usize) -> Router {
        let config = AppConfig::default();
        let orchestrator = TurnOrchestrator::new(
            Arc::new(QuietProvider),
            Arc::new(decisionflow_tools::default_registry(None)),
            &config,
        );
        build_router(orchestrator, max_body_bytes)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let response = app(1024)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn turn_is_nested_under_v1() {
        let body = serde_json::json!({
            "message": "hello",
            "scenario_id": "s1",
            "client_turn_id": "t1"
        });
        let response = app(64 * 1024)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/turn")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let body = serde_json::json!({
            "message": "x".repeat(4096),
            "scenario_id": "s1",
            "client_turn_id": "t1"
        });
        let response = app(512)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/turn")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
