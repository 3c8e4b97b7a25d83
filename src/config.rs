//! Configuration management module.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::StoredAuthorization;
use crate::protocol::NAME_SIZE;

/// Configuration load result.
#[derive(Debug)]
pub enum ConfigLoadResult {
    /// Config loaded successfully.
    Loaded(AppConfig),
    /// Config file missing (first run).
    Missing,
    /// Config file exists but invalid.
    Invalid(ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Device used when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_device: Option<String>,
    #[serde(default)]
    pub ble: BleConfig,
    #[serde(default)]
    pub client: ClientConfig,
    /// Paired locks keyed by BLE address.
    #[serde(default)]
    pub authorizations: BTreeMap<String, StoredAuthorization>,
}

/// Bluetooth adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleConfig {
    /// Scan timeout in seconds (default: 10).
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Index into the host's adapter list (default: 0).
    #[serde(default)]
    pub adapter_index: usize,
}

fn default_scan_timeout_secs() -> u64 {
    10
}

/// How this client presents itself to the lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Display name sent while pairing.
    #[serde(default = "default_client_name")]
    pub name: String,
}

fn default_client_name() -> String {
    "keyturner cli".to_string()
}

impl AppConfig {
    /// Get config file path in the platform configuration directory.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "keyturner")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Attempt to load config with detailed result.
    pub fn try_load(path: &Path) -> ConfigLoadResult {
        if !path.exists() {
            return ConfigLoadResult::Missing;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<AppConfig>(&content) {
                Ok(config) => match config.validate() {
                    Ok(()) => ConfigLoadResult::Loaded(config),
                    Err(e) => ConfigLoadResult::Invalid(e),
                },
                Err(e) => ConfigLoadResult::Invalid(ConfigError::Parse(e)),
            },
            Err(e) => ConfigLoadResult::Invalid(ConfigError::Read(e)),
        }
    }

    /// Load config, treating a missing file as defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::try_load(path) {
            ConfigLoadResult::Loaded(config) => Ok(config),
            ConfigLoadResult::Missing => Ok(Self::default()),
            ConfigLoadResult::Invalid(e) => Err(e),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ble.scan_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "Scan timeout must be at least 1 second".to_string(),
            ));
        }
        if self.client.name.trim().is_empty() {
            return Err(ConfigError::Validation("Client name cannot be empty".to_string()));
        }
        if self.client.name.len() > NAME_SIZE {
            return Err(ConfigError::Validation(format!(
                "Client name cannot exceed {NAME_SIZE} bytes"
            )));
        }
        if let Some(device) = &self.active_device {
            if device.trim().is_empty() {
                return Err(ConfigError::Validation("Active device cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Save configuration to file, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Device to act on: explicit argument first, then the active device.
    pub fn resolve_device<'a>(&'a self, explicit: Option<&'a str>) -> Option<&'a str> {
        explicit.or(self.active_device.as_deref())
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: default_scan_timeout_secs(),
            adapter_index: 0,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
        }
    }
}
