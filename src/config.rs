use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::{DEFAULT_API_URL, DEFAULT_WEBSOCKET_URL, TrackerOptions};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Push channel endpoint
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    /// REST API base, used for polling and the component list
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Polling interval while the push channel is down
    #[serde(default = "default_update_interval")]
    pub update_interval_ms: u64,
    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Fetch the component list once on start
    #[serde(default = "default_true")]
    pub load_components_on_start: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            websocket_url: default_websocket_url(),
            api_url: default_api_url(),
            update_interval_ms: default_update_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            load_components_on_start: true,
        }
    }
}

impl TrackerConfig {
    /// Runtime options for the transport
    pub fn options(&self) -> TrackerOptions {
        TrackerOptions {
            websocket_url: self.websocket_url.clone(),
            api_url: self.api_url.clone(),
            update_interval: Duration::from_millis(self.update_interval_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            load_components_on_start: self.load_components_on_start,
        }
    }
}

fn default_websocket_url() -> String {
    DEFAULT_WEBSOCKET_URL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_update_interval() -> u64 {
    30_000
}

fn default_reconnect_delay() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

/// Output settings for `watch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Print notices for significant events
    #[serde(default = "default_true")]
    pub notices: bool,
    /// Print every raw event as well
    #[serde(default)]
    pub events: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            notices: true,
            events: false,
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "migration-status", "MigrationStatus")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
