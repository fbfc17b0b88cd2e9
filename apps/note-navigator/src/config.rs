//! Configuration for the note navigator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the markdown vault.
    #[serde(default = "default_vault_root")]
    pub vault_root: PathBuf,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_root: default_vault_root(),
            display: DisplayConfig::default(),
        }
    }
}

fn default_vault_root() -> PathBuf {
    directories::UserDirs::new()
        .map(|d| d.home_dir().join("notes"))
        .unwrap_or_else(|| "notes".into())
}

impl Config {
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(self)?;
            std::fs::write(path, content)?;
        }
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "note-navigator")
            .map(|d| d.config_dir().join("config.toml"))
    }

    pub fn log_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "note-navigator")
            .map(|d| d.data_dir().join("navigator.log"))
    }

    /// Engine settings live inside the vault so they travel with it.
    pub fn settings_path(&self) -> PathBuf {
        self.vault_root.join(".navigator").join("settings.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_header: bool,
    #[serde(default = "default_preview_lines")]
    pub preview_lines: usize,
}

fn default_true() -> bool { true }
fn default_preview_lines() -> usize { 30 }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_header: true,
            preview_lines: 30,
        }
    }
}
