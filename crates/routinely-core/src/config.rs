//! TOML-based application configuration.
//!
//! Stored at `~/.config/routinely/config.toml`. A missing file yields
//! defaults; unknown keys are preserved by serde defaults on load.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Engine timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `task_ending_soon` fires when remaining time drops to this.
    #[serde(default = "default_ending_warning")]
    pub task_ending_warning_secs: u32,
    /// Confirm window applied when a task's own window is absent.
    #[serde(default = "default_confirm_window")]
    pub default_confirm_window_secs: u32,
    /// Snooze length when the caller does not pass one.
    #[serde(default = "default_snooze")]
    pub default_snooze_secs: u32,
}

fn default_ending_warning() -> u32 {
    10
}

fn default_confirm_window() -> u32 {
    30
}

fn default_snooze() -> u32 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_ending_warning_secs: default_ending_warning(),
            default_confirm_window_secs: default_confirm_window(),
            default_snooze_secs: default_snooze(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Default config file location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or_else(|| ConfigError::LoadFailed {
            path: PathBuf::new(),
            message: "no config directory".into(),
        })?;
        Ok(dir.join("routinely").join("config.toml"))
    }

    /// Load from the default location; missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                path: path.clone(),
                message: e.to_string(),
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    /// Set a single `section.key` value from its string form. Used by the
    /// CLI `config set` command.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let parse = |v: &str| -> Result<u32, ConfigError> {
            v.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a number of seconds, got '{v}'"),
            })
        };
        match key {
            "engine.task_ending_warning_secs" => {
                self.engine.task_ending_warning_secs = parse(value)?;
            }
            "engine.default_confirm_window_secs" => {
                self.engine.default_confirm_window_secs = parse(value)?;
            }
            "engine.default_snooze_secs" => {
                self.engine.default_snooze_secs = parse(value)?;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}
