//! `decisionflow init`: Write the default configuration.

use decisionflow_config::AppConfig;
use std::path::Path;

pub fn run(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() && !force {
        println!("Config already exists at: {}", config_path.display());
        println!("   Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    write_default(config_path)?;
    println!("Created config at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set llm.api_key (or DECISIONFLOW_API_KEY)");
    println!("   2. Optionally set analysis.url");
    println!("   3. Run: decisionflow serve");

    Ok(())
}

pub fn write_default(config_path: &Path) -> std::io::Result<()> {
    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(config_path, AppConfig::default_toml())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_default_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default(&path).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.llm.model, AppConfig::default().llm.model);
        assert_eq!(config.gateway.port, AppConfig::default().gateway.port);
    }

    #[test]
    fn existing_file_kept_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm]\nmodel = \"mine\"\n").unwrap();

        run(&path, false).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("mine"));

        run(&path, true).unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().contains("mine"));
    }
}
