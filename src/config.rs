//! Daemon configuration
//!
//! Loads ~/.config/tunc/config.yaml. Validation runs at startup and fails
//! fast: a malformed webhook URL is rejected before the first dispatch
//! instead of being discovered (and warned about) per batch.

use crate::error::{Result, TuncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default delivery attempts before a message is dead-lettered
fn default_max_delivery_attempts() -> u32 {
    crate::notify::MAX_DELIVERY_ATTEMPTS
}

fn default_batch_size() -> usize {
    16
}

fn default_db_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("tunc");
    path.push("items.db");
    path
}

/// Tunc daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuncConfig {
    /// Path to the SQLite item database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Webhook URL unlock notifications are POSTed to. When unset, the
    /// dispatcher dead-letters every event instead of attempting delivery.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Delivery attempts before a message is dead-lettered
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Messages pulled from the queue per dispatcher batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for TuncConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            webhook_url: None,
            max_delivery_attempts: default_max_delivery_attempts(),
            batch_size: default_batch_size(),
        }
    }
}

impl TuncConfig {
    /// Default config file location (~/.config/tunc/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("tunc");
        path.push("config.yaml");
        path
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: TuncConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` (or the default location); a missing file yields
    /// the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the config as YAML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_yaml::to_string(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Startup-time validation.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.webhook_url {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| TuncError::Config(format!("invalid webhook_url: {e}")))?;
            if parsed.scheme() != "https" && parsed.scheme() != "http" {
                return Err(TuncError::Config(format!(
                    "webhook_url must be http(s), got {}",
                    parsed.scheme()
                )));
            }
        }
        if self.max_delivery_attempts == 0 {
            return Err(TuncError::Config(
                "max_delivery_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TuncError::Config("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}
