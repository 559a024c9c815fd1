use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VeditError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Editor behavior
    #[serde(default)]
    pub editor: EditorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Debounce window for hover notifications, in milliseconds
    #[serde(default = "default_hover_debounce_ms")]
    pub hover_debounce_ms: u64,

    /// Maximum characters of element text kept in a selection record
    #[serde(default = "default_text_preview_limit")]
    pub text_preview_limit: usize,

    /// Label shown on the edit-mode indicator
    #[serde(default = "default_indicator_label")]
    pub indicator_label: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            hover_debounce_ms: default_hover_debounce_ms(),
            text_preview_limit: default_text_preview_limit(),
            indicator_label: default_indicator_label(),
        }
    }
}

fn default_hover_debounce_ms() -> u64 {
    60
}

fn default_text_preview_limit() -> usize {
    100
}

fn default_indicator_label() -> String {
    "Visual edit mode".to_string()
}

impl Config {
    /// Load configuration from all sources (file, env, defaults)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(&config_path))
            // Merge environment variables (VEDIT_*)
            .merge(Env::prefixed("VEDIT_").split("_"))
            .extract()
            .map_err(|e| VeditError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vedit")
            .join("config.toml")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| VeditError::ConfigError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }
}
