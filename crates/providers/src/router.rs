//! Provider construction from configuration.

use crate::analysis::HttpAnalysisEngine;
use crate::openai_compat::OpenAiCompatProvider;
use decisionflow_config::AppConfig;
use decisionflow_core::error::ProviderError;
use decisionflow_core::{AnalysisEngine, Provider};
use std::sync::Arc;

/// Build the configured LLM provider.
///
/// `ollama` needs no key; every other provider fails with `NotConfigured`
/// when no key is available. `custom` also requires `llm.api_url`.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let llm = &config.llm;
    let name = llm.provider.as_str();

    if name == "ollama" {
        return Ok(Arc::new(OpenAiCompatProvider::ollama(llm.api_url.as_deref())));
    }

    let api_key = llm.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "no API key for provider '{name}' (set llm.api_key or DECISIONFLOW_API_KEY)"
        ))
    })?;

    let base_url = match (&llm.api_url, default_base_url(name)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{name}' needs llm.api_url"
            )));
        }
    };

    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}

/// Build the analysis engine client, if one is configured.
pub fn build_analysis_engine(config: &AppConfig) -> Option<Arc<dyn AnalysisEngine>> {
    config.analysis.url.as_ref().map(|url| {
        Arc::new(HttpAnalysisEngine::new(url.clone(), config.analysis.timeout_ms))
            as Arc<dyn AnalysisEngine>
    })
}

fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}
