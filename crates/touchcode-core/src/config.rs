//! Application configuration.
//!
//! ## Learning: Serde for Serialization
//!
//! `#[serde(default)]` fills every missing field from `Default`, so a
//! config file only needs the keys a user actually wants to change and
//! older files keep loading after new settings are added.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::session::Theme;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where projects are kept
    pub storage: StorageConfig,

    /// Remote backend connection
    pub remote: RemoteConfig,

    /// Appearance
    pub ui: UiConfig,

    /// Preview pane behavior
    pub preview: PreviewConfig,
}

impl Config {
    /// Loads config from the default location.
    pub fn load() -> Self {
        Self::load_from_default_path().unwrap_or_else(|err| {
            tracing::warn!("Falling back to default config: {}", err);
            Self::default()
        })
    }

    /// Loads config from a file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads from the default config path.
    fn load_from_default_path() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("touchcode").join("config.toml"))
    }

    /// Saves the config to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the directory for on-device project data.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("touchcode")),
        }
    }
}

/// Which store backs the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Active backend
    pub backend: Backend,

    /// Override for the local data directory
    pub data_dir: Option<PathBuf>,

    /// Mirror remote projects on the device and read from the mirror
    /// when the backend is unreachable
    pub local_fallback: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            data_dir: None,
            local_fallback: true,
        }
    }
}

/// Remote backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Service base URL
    pub url: String,

    /// Public API key sent with every request
    pub api_key: String,

    /// Table holding project rows
    pub table: String,

    /// Signed-in user
    pub user_id: Option<String>,

    /// Bearer token for the signed-in user
    pub access_token: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Change polling interval in seconds
    pub poll_interval_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: "projects".to_string(),
            user_id: None,
            access_token: None,
            timeout_secs: 10,
            poll_interval_secs: 5,
        }
    }
}

/// UI appearance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Color theme
    pub theme: Theme,

    /// Viewport width (px) below which the mobile layout is used
    pub mobile_breakpoint: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            mobile_breakpoint: 768,
        }
    }
}

/// Preview configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Show the preview pane when a project is opened
    pub visible_on_open: bool,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("Data directory not found")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
