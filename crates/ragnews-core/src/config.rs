use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Environment variable overriding the API base URL
pub const API_BASE_ENV: &str = "RAGNEWS_API_BASE";

/// Backend the development proxy forwards to
pub const DEFAULT_API_BASE: &str = "http://localhost:4000";

/// Client configuration, loaded from `<config dir>/ragnews/config.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Send `DELETE /session/{id}` when the client exits
    pub delete_session_on_exit: bool,
    pub log_file: Option<PathBuf>,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            delete_session_on_exit: true,
            log_file: None,
            log_filter: None,
        }
    }
}

impl ClientConfig {
    /// XDG-compliant location of the config file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::PathError("Cannot determine config directory".into()))?;
        Ok(config_dir.join("ragnews").join("config.json"))
    }

    /// Load from `path`; a missing file yields the defaults
    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Resolve the effective configuration: file, then environment, then the
    /// explicit `api_base` override (e.g. a CLI flag).
    pub async fn resolve(
        path: Option<&Path>,
        api_base_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let config = Self::load_from(&path).await?;
        Ok(config.with_overrides(std::env::var(API_BASE_ENV).ok(), api_base_override))
    }

    /// Apply API base overrides; later arguments win, blank values are ignored
    pub fn with_overrides(mut self, env_base: Option<String>, cli_base: Option<String>) -> Self {
        for candidate in [env_base, cli_base].into_iter().flatten() {
            let candidate = candidate.trim();
            if !candidate.is_empty() {
                self.api_base = candidate.to_string();
            }
        }
        self.api_base = self.api_base.trim_end_matches('/').to_string();
        self
    }

    /// Log file path, defaulting to `<cache dir>/ragnews/ragnews.log`
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("ragnews").join("ragnews.log")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from(&dir.path().join("config.json"))
            .await
            .unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"api_base": "https://news.example.com", "delete_session_on_exit": false}"#)
            .await
            .unwrap();

        let config = ClientConfig::load_from(&path).await.unwrap();
        assert_eq!(config.api_base, "https://news.example.com");
        assert!(!config.delete_session_on_exit);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ nope").await.unwrap();

        let err = ClientConfig::load_from(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::SerializationError(_)));
    }

    #[test]
    fn test_override_precedence() {
        let base = ClientConfig::default();

        let env_only = base.clone().with_overrides(Some("http://env:1".into()), None);
        assert_eq!(env_only.api_base, "http://env:1");

        let both = base
            .clone()
            .with_overrides(Some("http://env:1".into()), Some("http://cli:2/".into()));
        assert_eq!(both.api_base, "http://cli:2");

        let blank = base.with_overrides(Some("  ".into()), None);
        assert_eq!(blank.api_base, DEFAULT_API_BASE);
    }
}
