//! Persisted user settings in a TOML file under the config directory

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use dictation_core::config::{validate_speed, SettingsStore};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to write settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_speed")]
    pub playback_speed: f64,
}

fn default_speed() -> f64 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self { playback_speed: default_speed() }
    }
}

pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("melodic-dictation")
        .join("settings.toml")
}

/// Settings file; unreadable or malformed files read as defaults
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl Default for TomlSettingsStore {
    fn default() -> Self {
        Self::at(settings_path())
    }
}

impl TomlSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Settings {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(settings)?)?;
        Ok(())
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load_speed(&self) -> Option<f64> {
        Some(self.load().playback_speed).filter(|s| validate_speed(*s).is_ok())
    }

    fn save_speed(&mut self, speed: f64) {
        let settings = Settings { playback_speed: speed };
        if let Err(e) = self.save(&settings) {
            warn!(path = %self.path.display(), error = %e, "Could not save settings");
        }
    }
}
