//! Supervisor configuration types and persistence
//!
//! Handles loading and saving supervisor settings from disk.

use super::platform::ReleaseTable;
use crate::error::SupervisorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used below the platform config/data dirs
pub const APP_DIR_NAME: &str = "p2pool-supervisor";

/// Supervisor configuration stored in supervisor.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Where p2pool is installed; `~` and `%VAR%` are expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_root: Option<String>,

    /// Connect/response timeout for downloads
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval of the background status poller
    #[serde(default = "default_status_poll_secs")]
    pub status_poll_secs: u64,

    /// Replaces the built-in release table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releases: Option<ReleaseTable>,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_status_poll_secs() -> u64 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            install_root: None,
            request_timeout_secs: default_request_timeout_secs(),
            status_poll_secs: default_status_poll_secs(),
            releases: None,
        }
    }
}

impl SupervisorConfig {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("supervisor.json")
    }

    /// Load config from disk, or return default if not found
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    log::warn!("{}, using defaults", e);
                }
                Self::default()
            }
        }
    }

    /// Load config from `path`, failing on missing or malformed files
    pub fn load_from(path: &Path) -> Result<Self, SupervisorError> {
        let contents = fs::read_to_string(path).map_err(|e| SupervisorError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| SupervisorError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), SupervisorError> {
        self.save_to(&Self::config_path())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), SupervisorError> {
        let config_error = |message: String| SupervisorError::Config {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| config_error(format!("Failed to create config dir: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| config_error(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents)
            .map_err(|e| config_error(format!("Failed to write config: {}", e)))?;

        log::info!("Supervisor config saved to {}", path.display());
        Ok(())
    }

    /// Default directory the p2pool binary is installed into
    pub fn default_install_root() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join("p2pool")
        }

        #[cfg(target_os = "macos")]
        {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join("p2pool")
        }

        #[cfg(target_os = "linux")]
        {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".p2pool-supervisor")
                .join("p2pool")
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            PathBuf::from(".").join("p2pool")
        }
    }

    /// Install root for this config (configured or default)
    pub fn install_root(&self) -> PathBuf {
        match &self.install_root {
            Some(dir) if !dir.is_empty() => PathBuf::from(crate::expand_path(dir)),
            _ => Self::default_install_root(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_secs.max(1))
    }

    /// Release table in effect (configured or built-in)
    pub fn release_table(&self) -> ReleaseTable {
        self.releases.clone().unwrap_or_else(ReleaseTable::builtin)
    }
}

/// Paths used by the supervisor (for display)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorPaths {
    pub install_root: String,
    pub binary: String,
    pub stats_file: String,
    pub config: String,
}
