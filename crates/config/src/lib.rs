//! Configuration for the openpasture planner.
//!
//! Loaded from `~/.openpasture/config.json`; every field has a serde
//! default so a partial file or no file at all still yields a working
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, farms_dir};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config not found: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Generative capability credentials and endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// Planner round-trip parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for PlannerDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

/// Farm-level policy settings applied when a farm document carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmDefaults {
    #[serde(default = "default_min_ndvi_threshold")]
    pub min_ndvi_threshold: f64,
    #[serde(default = "default_min_rest_period_days")]
    pub min_rest_period_days: u32,
    #[serde(default = "default_section_pct")]
    pub default_section_pct: f64,
}

impl Default for FarmDefaults {
    fn default() -> Self {
        Self {
            min_ndvi_threshold: default_min_ndvi_threshold(),
            min_rest_period_days: default_min_rest_period_days(),
            default_section_pct: default_section_pct(),
        }
    }
}

fn default_min_ndvi_threshold() -> f64 {
    0.40
}

fn default_min_rest_period_days() -> u32 {
    21
}

fn default_section_pct() -> f64 {
    0.20
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub planner: PlannerDefaults,
    #[serde(default)]
    pub farm: FarmDefaults,
    /// Overrides `~/.openpasture/farms` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farms_dir: Option<String>,
}

impl Config {
    pub async fn load() -> Result<Self> {
        Self::load_from(&config_path()).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }

        debug!(path = %path.display(), "loading config");
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&config_path()).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "saving config");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn api_key(&self) -> Option<String> {
        let key = self.provider.api_key.clone();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    pub fn api_base(&self) -> Option<String> {
        self.provider.api_base.clone()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn default_model(&self) -> String {
        self.planner.model.clone()
    }

    /// Resolved directory of farm documents, with `~` expansion.
    pub fn farms_dir(&self) -> PathBuf {
        match &self.farms_dir {
            Some(dir) => {
                if let Some(rest) = dir.strip_prefix("~/") {
                    if let Some(home) = dirs::home_dir() {
                        return home.join(rest);
                    }
                }
                PathBuf::from(dir)
            }
            None => paths::farms_dir(),
        }
    }
}

/// Write a default config (if none exists) and create the data layout.
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!(path = %config_path.display(), "config already exists, leaving it unchanged");
    } else {
        let config = Config::default();
        config.save().await?;
        info!(path = %config_path.display(), "default config written");
    }

    let config = Config::load().await?;
    paths::ensure_dir(&config.farms_dir()).await?;
    Ok(config)
}
