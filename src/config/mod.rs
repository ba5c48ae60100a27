//! # Configuration Management Module
//!
//! Centralized configuration for the questline server: validation,
//! defaults, and TOML persistence.
//!
//! ## Configuration Structure
//!
//! - [`EngineConfig`] - quest content location and scheduler cadence
//! - [`StorageConfig`] - player database and backup settings
//! - [`LoggingConfig`] - logging level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use questline::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("questline.toml").await?;
//!     println!("Packages dir: {}", config.engine.packages_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [engine]
//! packages_dir = "./packages"
//! autosave_minutes = 5
//!
//! [storage]
//! data_dir = "./data"
//! backup_dir = "./backups"
//! backup_interval_hours = 24
//! backup_keep = 7
//!
//! [logging]
//! level = "info"
//! file = "questline.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding quest package subdirectories.
    pub packages_dir: String,
    /// How often joined players are flushed to the store. 0 disables
    /// autosave (players still save on leave and shutdown).
    #[serde(default = "default_autosave_minutes")]
    pub autosave_minutes: u32,
}

fn default_autosave_minutes() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub backup_dir: String,
    /// Hours between automatic snapshots. 0 disables the scheduler.
    #[serde(default = "default_backup_interval_hours")]
    pub backup_interval_hours: u32,
    /// Automatic snapshots kept by the pruner.
    #[serde(default = "default_backup_keep")]
    pub backup_keep: usize,
}

fn default_backup_interval_hours() -> u32 {
    24
}

fn default_backup_keep() -> usize {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.engine.packages_dir.trim().is_empty() {
            return Err(anyhow!("engine.packages_dir must not be empty"));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(anyhow!("unknown logging.level: {}", other)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig {
                packages_dir: "./packages".to_string(),
                autosave_minutes: default_autosave_minutes(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                backup_dir: "./backups".to_string(),
                backup_interval_hours: default_backup_interval_hours(),
                backup_keep: default_backup_keep(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("questline.log".to_string()),
            },
        }
    }
}
