pub mod assemble;
pub mod init;
pub mod serve;

use decisionflow_config::AppConfig;
use std::path::{Path, PathBuf};

pub fn default_config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

/// Load `path` with environment overrides applied.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}"))
}
