use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::{Path, PathBuf}};
use tokio::fs;

use crate::aggregate::DEFAULT_HISTORY_LIMIT;

pub const CONFIG_PATH_ENV: &str = "PROCWATCH_COLLECTOR_CONFIG";
pub const API_KEY_ENV: &str = "PROCWATCH_API_KEY";
pub const BIND_ENV: &str = "PROCWATCH_BIND";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("api_key manquante (collector.yaml ou PROCWATCH_API_KEY)")]
    MissingApiKey,
    #[error("adresse d'écoute invalide `{0}`")]
    InvalidBind(String),
    #[error("lecture config impossible: {0}")]
    Io(#[from] std::io::Error),
    #[error("config invalide: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CollectorConfig {
    pub bind: SocketAddr,
    pub api_key: String,
    /// Dossier du journal snapshots.jsonl ; absent = store mémoire uniquement
    pub data_dir: Option<PathBuf>,
    pub history_limit: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            api_key: String::new(),
            data_dir: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CollectorConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(txt)?)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.api_key = key;
        }
        if let Some(bind) = lookup(BIND_ENV) {
            self.bind = bind.parse().map_err(|_| ConfigError::InvalidBind(bind))?;
        }
        Ok(())
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(self)
    }
}

/// Charge collector.yaml (ou $PROCWATCH_COLLECTOR_CONFIG), applique l'environnement,
/// échoue si la clé d'API est absente.
pub async fn load_config() -> Result<CollectorConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "collector.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        CollectorConfig::from_yaml(&fs::read_to_string(&path).await?)?
    } else {
        tracing::warn!(%path, "pas de fichier de config, valeurs par défaut + environnement");
        CollectorConfig::default()
    };

    cfg.apply_overrides(|key| std::env::var(key).ok())?;
    cfg.validate()
}
