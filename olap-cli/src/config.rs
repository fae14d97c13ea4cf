//! Configuration handling for the olap CLI
//!
//! Supports loading configuration from olap.toml files with CLI argument overrides.

use anyhow::{Context, Result};
use olap_core::{GrowConfig, PatchConfig, DEFAULT_RECORDS_PER_SHARD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CliError;

pub const DEFAULT_CONFIG_FILE: &str = "olap.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub grow: GrowConfig,
    #[serde(default)]
    pub patch: PatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Fragment ids per shard for newly created stores
    #[serde(default = "default_records_per_shard")]
    pub records_per_shard: u32,
}

fn default_records_per_shard() -> u32 {
    DEFAULT_RECORDS_PER_SHARD
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            records_per_shard: default_records_per_shard(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::file_not_found(path.to_path_buf()).into());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .map_err(CliError::from)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to serialize default configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.store.records_per_shard == 0 {
            return Err(CliError::config("store.records_per_shard must be at least 1").into());
        }
        if self.grow.max_batch == 0 {
            return Err(CliError::config("grow.max_batch must be at least 1").into());
        }
        if self.patch.io_buffer_records == 0 {
            return Err(CliError::config("patch.io_buffer_records must be at least 1").into());
        }
        Ok(())
    }
}
