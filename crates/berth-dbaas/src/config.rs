use crate::DbaasError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbaasConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl DbaasConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn load(path: &Path) -> Result<Self, DbaasError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| DbaasError::Config(format!("invalid DBaaS config: {e}")))?;
        config.endpoint = config.endpoint.trim_end_matches('/').to_owned();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), DbaasError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| DbaasError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// `~/.config/berth/dbaas.json`
pub fn default_config_path() -> Result<PathBuf, DbaasError> {
    let home = std::env::var("HOME").map_err(|_| DbaasError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/berth/dbaas.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbaas.json");

        let config = DbaasConfig::new("http://dbaas.example.com:5000").with_timeout_secs(2);
        config.save(&path).unwrap();

        let loaded = DbaasConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn config_strips_trailing_slash() {
        let config = DbaasConfig::new("http://dbaas.example.com/");
        assert_eq!(config.endpoint, "http://dbaas.example.com");
    }

    #[test]
    fn timeout_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbaas.json");
        std::fs::write(&path, r#"{"endpoint": "http://dbaas.local/"}"#).unwrap();
        let loaded = DbaasConfig::load(&path).unwrap();
        assert_eq!(loaded.endpoint, "http://dbaas.local");
        assert_eq!(loaded.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbaas.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            DbaasConfig::load(&path),
            Err(DbaasError::Config(_))
        ));
    }
}
