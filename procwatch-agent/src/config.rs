//! Agent configuration
//!
//! Handles:
//! - Loading from TOML or JSON (picked by file extension)
//! - Path resolution: CLI argument, `PROCWATCH_AGENT_CONFIG`, `./config.json`, OS config dir
//! - Environment overrides for the collector URL and credential
//! - Fail-fast validation of required settings

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::sampler::DEFAULT_SETTLE;

pub const CONFIG_PATH_ENV: &str = "PROCWATCH_AGENT_CONFIG";
pub const BACKEND_URL_ENV: &str = "PROCWATCH_BACKEND_URL";
pub const API_KEY_ENV: &str = "PROCWATCH_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validated agent settings
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub backend_url: String,
    pub api_key: String,
    /// 0 = one-shot
    pub interval_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_seconds: u64,
    pub timeout_seconds: u64,
    pub settle_millis: u64,
}

/// File representation, everything optional until validated
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    backend_url: Option<String>,
    api_key: Option<String>,
    interval_seconds: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_seconds: Option<u64>,
    timeout_seconds: Option<u64>,
    settle_millis: Option<u64>,
}

impl RawConfig {
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.is_empty()) {
            self.backend_url = Some(url);
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api_key = Some(key);
        }
    }

    fn validate(self) -> Result<AgentConfig, ConfigError> {
        let backend_url = self
            .backend_url
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("backend_url"))?;
        let api_key = self
            .api_key
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("api_key"))?;

        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "backend_url",
                reason: format!("expected an http(s) URL, got {backend_url}"),
            });
        }

        let timeout_seconds = self.timeout_seconds.unwrap_or(10);
        if timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_seconds",
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(AgentConfig {
            backend_url,
            api_key,
            interval_seconds: self.interval_seconds.unwrap_or(0),
            max_retries: self.max_retries.unwrap_or(3),
            retry_backoff_seconds: self.retry_backoff_seconds.unwrap_or(2),
            timeout_seconds,
            settle_millis: self.settle_millis.unwrap_or(DEFAULT_SETTLE.as_millis() as u64),
        })
    }
}

impl AgentConfig {
    /// Loads, overrides from the environment and validates.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not, as long as the environment supplies the required fields.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = explicit.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut raw = match explicit {
            Some(path) if path.exists() => Self::read_file(&path)?,
            Some(path) => return Err(ConfigError::NotFound(path)),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read_file(&path)?,
                _ => RawConfig::default(),
            },
        };

        raw.apply_overrides(|key| std::env::var(key).ok());
        raw.validate()
    }

    /// `./config.json` when present, otherwise `<config_dir>/procwatch-agent/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from("config.json");
        if local.exists() {
            return Some(local);
        }

        let mut path = dirs::config_dir()?;
        path.push("procwatch-agent");
        path.push("config.toml");
        Some(path)
    }

    fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<RawConfig, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Ok(toml::from_str(content)?),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }
}
