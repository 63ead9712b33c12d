use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use streampay_types::EngineConfig;

pub const CONFIG_FILE: &str = "streampay.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: String,
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "streampay.db".to_string(),
            backend_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads config from a specified path.
    /// Returns default config if file doesn't exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config)
    }

    /// Saves config to a specified path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.database_path, "streampay.db");
        assert_eq!(config.backend_url, "http://127.0.0.1:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.engine.stream_error_timeout_ms, 30_000);
    }

    #[test]
    fn test_file_io() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("streampay.json");

        let config = AppConfig {
            database_path: "/var/lib/streampay/streams.db".to_string(),
            backend_url: "http://node.local:9000".to_string(),
            request_timeout_secs: 5,
            engine: EngineConfig {
                stream_error_timeout_ms: 10_000,
                memo_prefix: "tip: ".to_string(),
            },
        };

        config.save_to(&file_path).unwrap();
        let loaded = AppConfig::load_from(&file_path).unwrap();

        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("nonexistent.json");

        let config = AppConfig::load_from(&file_path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.json");
        fs::write(&file_path, r#"{"engine":{"stream_error_timeout_ms":500}}"#).unwrap();

        let config = AppConfig::load_from(&file_path).unwrap();
        assert_eq!(config.backend_url, "http://127.0.0.1:8080");
        assert_eq!(config.engine.stream_error_timeout_ms, 500);
        assert!(config.engine.memo_prefix.is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("broken.json");
        fs::write(&file_path, "{ not json").unwrap();

        let err = AppConfig::load_from(&file_path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }
}
