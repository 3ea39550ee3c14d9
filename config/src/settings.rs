//! Application settings management

use crate::{crypto, PathManager};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Application settings stored in settings.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Model used for agent turns (e.g., "gemini-2.0-flash")
    pub default_model: Option<String>,
    /// Encrypted API keys (provider name -> encrypted key)
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    /// Tool-execution cycles allowed per instruction
    pub max_iterations: Option<usize>,
    /// Vault used when `--vault` is not given
    pub vault_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the settings file, or return defaults if not found
    pub fn load() -> Self {
        match PathManager::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };

        toml::from_str(&content).unwrap_or_default()
    }

    /// Save settings to the settings file
    pub fn save(&self) -> Result<(), String> {
        let path = PathManager::settings_path().ok_or("Could not determine settings path")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))?;
        Ok(())
    }

    /// Get a decrypted API key for a provider.
    /// Returns None if not set or decryption fails.
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys
            .get(provider)
            .and_then(|encrypted| crypto::decrypt_string(encrypted).ok())
    }

    /// Set an API key for a provider (encrypts before storing).
    pub fn set_api_key(&mut self, provider: &str, api_key: &str) -> Result<(), String> {
        let encrypted = crypto::encrypt_string(api_key)?;
        self.api_keys.insert(provider.to_string(), encrypted);
        Ok(())
    }

    pub fn model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(crate::DEFAULT_MODEL)
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations.unwrap_or(crate::DEFAULT_MAX_ITERATIONS)
    }
}
