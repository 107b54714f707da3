//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! API base URL, the last used username, polling timings, and where the
//! session is persisted.
//!
//! Configuration is stored at `~/.config/hearth/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{CredentialBackend, FileBackend, KeyringBackend};
use crate::notify::{PollerConfig, DEFAULT_POLL_INTERVAL, DEFAULT_TOAST_DURATION};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "hearth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Used when neither the config file nor the environment names a server
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackendKind {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_username: Option<String>,
    pub poll_interval_secs: u64,
    pub toast_secs: u64,
    pub credential_backend: CredentialBackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            last_username: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            toast_secs: DEFAULT_TOAST_DURATION.as_secs(),
            credential_backend: CredentialBackendKind::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let config: Self = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        Ok(config.validated())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Replace nonsensical timings with defaults
    fn validated(mut self) -> Self {
        if self.poll_interval_secs == 0 {
            warn!("poll_interval_secs must be positive, using default");
            self.poll_interval_secs = DEFAULT_POLL_INTERVAL.as_secs();
        }
        if self.toast_secs == 0 {
            warn!("toast_secs must be positive, using default");
            self.toast_secs = DEFAULT_TOAST_DURATION.as_secs();
        }
        self
    }

    /// Base URL to talk to. `env_override` (from `HEARTH_API_URL`) wins
    /// over the config file.
    pub fn resolve_api_base_url(&self, env_override: Option<&str>) -> String {
        let raw = env_override
            .filter(|s| !s.trim().is_empty())
            .or(self.api_base_url.as_deref())
            .unwrap_or(DEFAULT_API_BASE_URL);
        normalize_base_url(raw)
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            toast_duration: Duration::from_secs(self.toast_secs),
        }
    }

    /// The persistence backend selected for the credential store
    pub fn open_backend(&self) -> Result<Box<dyn CredentialBackend>> {
        Ok(match self.credential_backend {
            CredentialBackendKind::File => Box::new(FileBackend::new(self.cache_dir()?)),
            CredentialBackendKind::Keyring => Box::new(KeyringBackend::new()),
        })
    }
}

/// Bare host names get `https://`; trailing slashes are dropped.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("api.example.com"), "https://api.example.com");
        assert_eq!(normalize_base_url("http://localhost:8000/"), "http://localhost:8000");
        assert_eq!(normalize_base_url(" https://x.io "), "https://x.io");
    }

    #[test]
    fn test_api_base_url_precedence() {
        let mut config = Config::default();
        assert_eq!(config.resolve_api_base_url(None), DEFAULT_API_BASE_URL);

        config.api_base_url = Some("from-file.example".to_string());
        assert_eq!(config.resolve_api_base_url(None), "https://from-file.example");
        assert_eq!(config.resolve_api_base_url(Some("")), "https://from-file.example");
        assert_eq!(
            config.resolve_api_base_url(Some("http://env:9000")),
            "http://env:9000"
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"last_username":"mia"}"#).unwrap();
        assert_eq!(config.last_username.as_deref(), Some("mia"));
        assert_eq!(config.poll_interval_secs, 8);
        assert_eq!(config.toast_secs, 3);
        assert_eq!(config.credential_backend, CredentialBackendKind::File);
    }

    #[test]
    fn test_zero_timings_replaced() {
        let config: Config =
            serde_json::from_str(r#"{"poll_interval_secs":0,"toast_secs":0}"#).unwrap();
        let poller = config.validated().poller();
        assert_eq!(poller, PollerConfig::default());
    }

    #[test]
    fn test_backend_kind_serde() {
        let config: Config = serde_json::from_str(r#"{"credential_backend":"keyring"}"#).unwrap();
        assert_eq!(config.credential_backend, CredentialBackendKind::Keyring);
    }
}
