//! Configuration loading, validation, and management for decisionflow.
//!
//! Loads configuration from `~/.decisionflow/config.toml` with environment
//! variable overrides. Validates all settings at startup. The loaded
//! [`AppConfig`] is passed into constructors; nothing reads it globally.

use decisionflow_core::Route;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.decisionflow/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub context: ContextConfig,

    /// Optional analysis engine endpoint
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// openai | openrouter | ollama | custom
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1500
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Deadline for the acknowledgement-only LLM call
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Deadline for the tool-enabled reasoning call
    #[serde(default = "default_reasoning_timeout_ms")]
    pub reasoning_timeout_ms: u64,

    /// Production mode hides internal diagnostics from envelopes
    #[serde(default)]
    pub production: bool,

    #[serde(default = "default_true")]
    pub response_cache_enabled: bool,

    #[serde(default = "default_response_cache_capacity")]
    pub response_cache_capacity: usize,

    #[serde(default = "default_idempotency_capacity")]
    pub idempotency_capacity: usize,

    #[serde(default = "default_ack_fallback_text")]
    pub ack_fallback_text: String,
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}
fn default_reasoning_timeout_ms() -> u64 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_response_cache_capacity() -> usize {
    256
}
fn default_idempotency_capacity() -> usize {
    4096
}
fn default_ack_fallback_text() -> String {
    "Got it. Your change has been recorded.".into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            reasoning_timeout_ms: default_reasoning_timeout_ms(),
            production: false,
            response_cache_enabled: true,
            response_cache_capacity: default_response_cache_capacity(),
            idempotency_capacity: default_idempotency_capacity(),
            ack_fallback_text: default_ack_fallback_text(),
        }
    }
}

/// Per-route profile override. Unset fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteProfileOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone1_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone2_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_selected_elements: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,

    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,

    /// Keyed by route name (`chat`, `draft_graph`, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<String, RouteProfileOverride>,
}

fn default_prompt_version() -> String {
    "v3".into()
}
fn default_safety_factor() -> f64 {
    0.9
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            prompt_version: default_prompt_version(),
            safety_factor: default_safety_factor(),
            routes: BTreeMap::new(),
        }
    }
}

impl ContextConfig {
    /// The override configured for `route`, if any.
    pub fn route_override(&self, route: Route) -> Option<&RouteProfileOverride> {
        self.routes.get(route.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_analysis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_analysis_timeout_ms() -> u64 {
    20_000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_analysis_timeout_ms(),
        }
    }
}

/// Externally versioned knowledge whose version is folded into lineage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8787
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.decisionflow/config.toml).
    ///
    /// Environment overrides:
    /// - `DECISIONFLOW_API_KEY`, then `OPENAI_API_KEY` (only if no key in file)
    /// - `DECISIONFLOW_MODEL`
    /// - `DECISIONFLOW_REASONING_TIMEOUT_MS`
    /// - `DECISIONFLOW_ENV=production`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and re-validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("DECISIONFLOW_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("DECISIONFLOW_MODEL") {
            self.llm.model = model;
        }

        if let Some(raw) = lookup("DECISIONFLOW_REASONING_TIMEOUT_MS") {
            self.orchestrator.reasoning_timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "DECISIONFLOW_REASONING_TIMEOUT_MS must be an integer, got {raw:?}"
                ))
            })?;
        }

        if lookup("DECISIONFLOW_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")) {
            self.orchestrator.production = true;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".decisionflow")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(self.context.safety_factor > 0.0 && self.context.safety_factor <= 1.0) {
            return Err(ConfigError::ValidationError(
                "context.safety_factor must be in (0, 1]".into(),
            ));
        }

        let orch = &self.orchestrator;
        if orch.ack_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.ack_timeout_ms must be > 0".into(),
            ));
        }
        if orch.reasoning_timeout_ms <= orch.ack_timeout_ms {
            return Err(ConfigError::ValidationError(format!(
                "orchestrator.reasoning_timeout_ms ({}) must be greater than ack_timeout_ms ({})",
                orch.reasoning_timeout_ms, orch.ack_timeout_ms
            )));
        }
        if orch.response_cache_enabled && orch.response_cache_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.response_cache_capacity must be > 0 when the cache is enabled".into(),
            ));
        }
        if orch.idempotency_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.idempotency_capacity must be > 0".into(),
            ));
        }

        for name in self.context.routes.keys() {
            if name.parse::<Route>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "context.routes has unknown route '{name}'"
                )));
            }
        }

        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.gateway.port, 8787);
        assert_eq!(config.orchestrator.ack_timeout_ms, 5000);
        assert_eq!(config.orchestrator.reasoning_timeout_ms, 30000);
        assert_eq!(config.context.prompt_version, "v3");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.model, config.llm.model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.llm.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reasoning_timeout_must_exceed_ack() {
        let mut config = AppConfig::default();
        config.orchestrator.reasoning_timeout_ms = config.orchestrator.ack_timeout_ms;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reasoning_timeout_ms"));
    }

    #[test]
    fn safety_factor_bounds() {
        let mut config = AppConfig::default();
        config.context.safety_factor = 0.0;
        assert!(config.validate().is_err());
        config.context.safety_factor = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("8787"));
        assert!(!toml_str.contains("api_key"));
    }

    #[test]
    fn route_overrides_parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[context]
prompt_version = "v4"

[context.routes.chat]
max_turns = 2
total_tokens = 4000

[context.routes.draft_graph]
echo_selected_elements = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.context.prompt_version, "v4");
        let chat = config.context.route_override(Route::Chat).unwrap();
        assert_eq!(chat.max_turns, Some(2));
        assert_eq!(chat.total_tokens, Some(4000));
        assert!(chat.zone1_tokens.is_none());
        assert!(config.context.route_override(Route::EditGraph).is_none());
    }

    #[test]
    fn unknown_route_override_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[context.routes.brainstorm]\nmax_turns = 2\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm\nmodel = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("DECISIONFLOW_MODEL", "gpt-4.1"),
            ("DECISIONFLOW_REASONING_TIMEOUT_MS", "45000"),
            ("DECISIONFLOW_ENV", "Production"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.model, "gpt-4.1");
        assert_eq!(config.orchestrator.reasoning_timeout_ms, 45000);
        assert!(config.orchestrator.production);
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("from-file".into());
        config
            .apply_overrides(|k| (k == "DECISIONFLOW_API_KEY").then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn bad_timeout_env_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|k| {
            (k == "DECISIONFLOW_REASONING_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-secret-value".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }
}
