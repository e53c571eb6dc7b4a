//! Murmur Settings
//!
//! Config file management for Murmur services. Each service defines its own
//! config type and wraps it in `Settings<T>` for JSON persistence under the
//! platform config directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(String),
    #[error("Failed to write settings: {0}")]
    WriteError(String),
    #[error("Failed to parse settings: {0}")]
    ParseError(String),
    #[error("Failed to create directory: {0}")]
    CreateDirError(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Generic settings wrapper for any serializable config type.
///
/// ```ignore
/// let settings: Settings<DaemonConfig> = Settings::load_or_default("murmur", None)?;
/// ```
pub struct Settings<T> {
    pub config: T,
    path: PathBuf,
}

impl<T: Serialize + DeserializeOwned + Default> Settings<T> {
    /// Load settings from the default path for a service, or create defaults.
    pub fn load_or_default(service: &str, custom_path: Option<&Path>) -> Result<Self> {
        let path = match custom_path {
            Some(p) => p.to_path_buf(),
            None => default_settings_path(service),
        };

        if path.exists() {
            debug!("Loading settings from {}", path.display());
            let content = fs::read_to_string(&path)
                .map_err(|e| SettingsError::ReadError(e.to_string()))?;
            let config: T = serde_json::from_str(&content)
                .map_err(|e| SettingsError::ParseError(e.to_string()))?;
            Ok(Self { config, path })
        } else {
            debug!("Creating default settings at {}", path.display());
            let settings = Self {
                config: T::default(),
                path,
            };
            settings.save()?;
            Ok(settings)
        }
    }

    /// Save current settings to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SettingsError::CreateDirError(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(&self.config)
            .map_err(|e| SettingsError::WriteError(e.to_string()))?;
        fs::write(&self.path, content)
            .map_err(|e| SettingsError::WriteError(e.to_string()))
    }

    /// Get the path where settings are stored.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Get the default settings file path for a service.
pub fn default_settings_path(service: &str) -> PathBuf {
    default_config_dir_for(service).join("settings.json")
}

/// Get the default config directory for a given service name.
///
/// - macOS: `~/Library/Application Support/{ServiceName}`
/// - Linux: `~/.config/{service_name}`
/// - Windows: `%APPDATA%\{ServiceName}`
pub fn default_config_dir_for(service: &str) -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        home_dir()
            .join("Library")
            .join("Application Support")
            .join(capitalize(service))
    }
    #[cfg(target_os = "linux")]
    {
        let xdg = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join(".config"));
        xdg.join(service.to_lowercase())
    }
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"));
        appdata.join(capitalize(service))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        home_dir().join(format!(".{}", service.to_lowercase()))
    }
}

/// Get the default data directory for a given service name.
///
/// - macOS: `~/Library/Application Support/{ServiceName}`
/// - Linux: `~/.local/share/{service_name}`
/// - Windows: `%APPDATA%\{ServiceName}`
pub fn default_data_dir_for(service: &str) -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        home_dir()
            .join("Library")
            .join("Application Support")
            .join(capitalize(service))
    }
    #[cfg(target_os = "linux")]
    {
        let xdg = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join(".local").join("share"));
        xdg.join(service.to_lowercase())
    }
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"));
        appdata.join(capitalize(service))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        home_dir().join(format!(".{}", service.to_lowercase()))
    }
}

/// Expand `~` in paths to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if path.starts_with('~') {
        home_dir().join(&path[2..])
    } else {
        PathBuf::from(path)
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().to_string() + &chars.as_str().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct TestConfig {
        rpc_url: String,
        max_tips_per_day: u32,
    }

    #[test]
    fn test_settings_load_or_default() {
        let dir = std::env::temp_dir().join("murmur-settings-test");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("settings.json");

        // Create default
        let settings: Settings<TestConfig> =
            Settings::load_or_default("murmur", Some(&path)).unwrap();
        assert_eq!(settings.config, TestConfig::default());

        // Load existing
        let settings2: Settings<TestConfig> =
            Settings::load_or_default("murmur", Some(&path)).unwrap();
        assert_eq!(settings2.config, TestConfig::default());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = std::env::temp_dir().join("murmur-settings-test-save");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("settings.json");

        let mut settings: Settings<TestConfig> =
            Settings::load_or_default("murmur", Some(&path)).unwrap();
        settings.config.rpc_url = "http://localhost:8545".to_string();
        settings.config.max_tips_per_day = 50;
        settings.save().unwrap();

        let loaded: Settings<TestConfig> =
            Settings::load_or_default("murmur", Some(&path)).unwrap();
        assert_eq!(loaded.config.rpc_url, "http://localhost:8545");
        assert_eq!(loaded.config.max_tips_per_day, 50);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_expand_path() {
        let p = expand_path("/absolute/path");
        assert_eq!(p, PathBuf::from("/absolute/path"));
    }
}
