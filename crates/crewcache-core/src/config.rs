//! Application configuration management.
//!
//! Holds the API base URL, the last used username, per-kind freshness
//! overrides and the caller-side retry settings.
//!
//! Configuration is stored at `~/.config/crewcache/config.json`. The
//! `CREWCACHE_API_URL` and `CREWCACHE_USERNAME` environment variables
//! (or a `.env` file loaded by the binary) take precedence over the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::FreshnessPolicy;
use crate::retry::RetryPolicy;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "crewcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Used when neither the config file nor the environment names a server
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

pub const ENV_API_URL: &str = "CREWCACHE_API_URL";
pub const ENV_USERNAME: &str = "CREWCACHE_USERNAME";
pub const ENV_PASSWORD: &str = "CREWCACHE_PASSWORD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub last_username: Option<String>,
    /// Freshness window overrides in seconds, keyed by entity kind name
    pub freshness: HashMap<String, u64>,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            last_username: None,
            freshness: HashMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply overrides from `lookup`, normally the process environment.
    /// Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = present(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(username) = present(ENV_USERNAME) {
            self.last_username = Some(username);
        }
    }

    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy::default().with_overrides(&self.freshness)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_retries,
            std::time::Duration::from_millis(self.retry.initial_backoff_ms),
        )
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the session file and logs
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir =
            dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntityKind;
    use chrono::Duration;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.last_username = Some("ada".to_string());
        config.freshness.insert("skills".to_string(), 30);
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"last_username": "grace"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.last_username.as_deref(), Some("grace"));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            ENV_API_URL => Some("https://volunteers.example.org/api".to_string()),
            ENV_USERNAME => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "https://volunteers.example.org/api");
        assert_eq!(config.last_username, None);
    }

    #[test]
    fn test_freshness_policy_from_config() {
        let mut config = Config::default();
        config.freshness.insert("workLogs".to_string(), 15);
        let policy = config.freshness_policy();
        assert_eq!(policy.window(EntityKind::WorkLogs), Duration::seconds(15));
        assert_eq!(policy.window(EntityKind::Users), Duration::seconds(60));
    }
}
