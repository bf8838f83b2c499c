//! Postbox configuration file handling
//!
//! Loads and saves ~/.config/postbox/config.yaml.

use crate::store::BackendKind;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Postbox configuration
///
/// Picks the storage backend and data directory once at startup, plus the
/// rules the mailbox engine enforces on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostboxConfig {
    /// Storage backend (flat_file or sqlite)
    #[serde(default)]
    pub backend: BackendKind,

    /// Directory holding the store files and attachments
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Required address suffix, e.g. "@mail.cm"; empty disables the check
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Age below which deleting a sent email unsends it
    #[serde(default = "default_unsend_window_secs")]
    pub unsend_window_secs: u64,

    /// Minimum password length for registration and password changes
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
}

fn config_root() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("postbox");
    path
}

fn default_data_dir() -> PathBuf {
    config_root().join("data")
}

fn default_domain() -> String {
    "@mail.cm".to_string()
}

fn default_unsend_window_secs() -> u64 {
    60
}

fn default_min_password_len() -> usize {
    6
}

impl PostboxConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
            domain: default_domain(),
            unsend_window_secs: default_unsend_window_secs(),
            min_password_len: default_min_password_len(),
        }
    }

    /// Defaults, rooted at a specific data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::new()
        }
    }

    /// Unsend window as a duration
    pub fn unsend_window(&self) -> Duration {
        Duration::from_secs(self.unsend_window_secs)
    }

    /// Load configuration from the default path
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::PostboxError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading Postbox configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            backend = %config.backend,
            data_dir = %config.data_dir.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving Postbox configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/postbox/config.yaml)
    pub fn default_path() -> PathBuf {
        config_root().join("config.yaml")
    }
}

impl Default for PostboxConfig {
    fn default() -> Self {
        Self::new()
    }
}
