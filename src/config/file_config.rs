//! Configuration file support.
//!
//! This module provides TOML configuration file parsing. All fields are
//! optional; anything omitted falls back to the serde defaults of the
//! runtime config types.
//!
//! # Configuration File Format
//!
//! ```toml
//! [retry]
//! max_retries = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 10000
//!
//! [rate_limits]
//! default_max_tokens = 5.0
//! default_refill_rate = 2.0
//!
//! [[rate_limits.provider_rates]]
//! provider = "slow-archive"
//! max_tokens = 1.0
//! refill_rate = 0.5
//!
//! [selection]
//! min_success_rate = 0.3
//! max_selected = 5
//! fallback_providers = ["open-archive"]
//!
//! [search]
//! strategy = "smart-parallel"
//! max_concurrency = 8
//! timeout_ms = 20000
//! ```

use std::path::{Path, PathBuf};

use super::OrchestratorConfig;

/// Loader for orchestrator configuration files
#[derive(Debug, Default)]
pub struct OrchestratorConfigFile;

impl OrchestratorConfigFile {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<OrchestratorConfig, ConfigFileError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigFileError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(config: &OrchestratorConfig, path: &Path) -> Result<(), ConfigFileError> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }
}

/// Locate a configuration file.
///
/// Checks, in order: the `RESEARCH_FANOUT_CONFIG` environment variable,
/// `./research-fanout.toml`, and `research-fanout/config.toml` under the
/// platform config directory.
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("RESEARCH_FANOUT_CONFIG") {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }

    let local = PathBuf::from("research-fanout.toml");
    if local.is_file() {
        return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("research-fanout").join("config.toml");
        if path.is_file() {
            return Some(path);
        }
    }

    None
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let toml_content = r#"
[retry]
max_retries = 4
initial_delay_ms = 250

[rate_limits]
default_max_tokens = 3.0

[[rate_limits.provider_rates]]
provider = "slow-archive"
max_tokens = 1.0
refill_rate = 0.5

[selection]
max_selected = 3
fallback_providers = ["open-archive"]

[search]
strategy = "sequential"
batch_size = 2
"#;

        std::fs::write(&path, toml_content).unwrap();

        let config = OrchestratorConfigFile::load(&path).unwrap();

        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.rate_limits.provider_rates.len(), 1);
        assert_eq!(config.rate_limits.provider_rates[0].provider, "slow-archive");
        assert_eq!(config.selection.max_selected, 3);
        assert_eq!(
            config.selection.fallback_providers,
            vec!["open-archive".to_string()]
        );
        assert_eq!(config.search.batch_size, 2);
    }

    #[test]
    fn test_config_file_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = OrchestratorConfig::default();
        config.retry.max_retries = 7;
        config.search.max_concurrency = 12;

        OrchestratorConfigFile::save(&config, &path).unwrap();

        let loaded = OrchestratorConfigFile::load(&path).unwrap();
        assert_eq!(loaded.retry.max_retries, 7);
        assert_eq!(loaded.search.max_concurrency, 12);
    }

    #[test]
    fn test_config_file_nonexistent() {
        let result = OrchestratorConfigFile::load(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");

        std::fs::write(&path, "invalid = toml = content").unwrap();

        let result = OrchestratorConfigFile::load(&path);
        assert!(matches!(result, Err(ConfigFileError::Parse(_))));
    }
}
