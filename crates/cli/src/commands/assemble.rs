//! `decisionflow assemble`: Print the context pack for a turn request.

use decisionflow_agent::{ContextPack, TurnOrchestrator};
use decisionflow_config::AppConfig;
use decisionflow_core::{Provider, TurnRequest};
use decisionflow_providers::OpenAiCompatProvider;
use std::path::Path;
use std::sync::Arc;

pub fn run(config_path: &Path, request_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let raw = std::fs::read_to_string(request_path)
        .map_err(|e| format!("Failed to read {}: {e}", request_path.display()))?;
    let pack = assemble(&config, &raw)?;
    println!("{}", serde_json::to_string_pretty(&pack)?);
    Ok(())
}

/// Parse a turn request and assemble its context.
pub fn assemble(config: &AppConfig, raw_request: &str) -> Result<ContextPack, String> {
    let request: TurnRequest =
        serde_json::from_str(raw_request).map_err(|e| format!("Invalid turn request: {e}"))?;

    // Assembly never calls the provider, so a missing API key is fine here.
    let provider: Arc<dyn Provider> = decisionflow_providers::build_from_config(config)
        .unwrap_or_else(|_| Arc::new(OpenAiCompatProvider::ollama(None)) as Arc<dyn Provider>);
    let tools = Arc::new(decisionflow_tools::default_registry(None));

    TurnOrchestrator::new(provider, tools, config).preview(&request)
}
