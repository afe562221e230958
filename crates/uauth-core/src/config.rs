//! Client configuration management.
//!
//! Configuration holds the issuer base URL, the request timeout, the token
//! storage backend and the last used username. It is stored at
//! `~/.config/uauth/config.json`; `UAUTH_URL`, `UAUTH_TIMEOUT_MS` and
//! `UAUTH_STORAGE` override the file.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::request::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "uauth";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_URL: &str = "UAUTH_URL";
pub const ENV_TIMEOUT_MS: &str = "UAUTH_TIMEOUT_MS";
pub const ENV_STORAGE: &str = "UAUTH_STORAGE";

/// Where the token pair is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" | "keychain" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub storage: StorageKind,
    pub last_username: Option<String>,
}

impl Config {
    /// Load from the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a key lookup (the environment, in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_URL).filter(|u| !u.trim().is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.timeout_ms = Some(ms),
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_MS),
            }
        }
        if let Some(raw) = lookup(ENV_STORAGE) {
            match raw.parse() {
                Ok(kind) => self.storage = kind,
                Err(e) => warn!(error = %e, "Ignoring invalid {}", ENV_STORAGE),
            }
        }
    }

    pub fn base_url(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("URL needs to be configured before usage"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Build the token store this configuration asks for.
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.storage {
            StorageKind::File => Arc::new(FileTokenStore::in_dir(self.cache_dir()?)),
            StorageKind::Keyring => Arc::new(KeyringTokenStore::default()),
            StorageKind::Memory => Arc::new(MemoryTokenStore::new()),
        };
        Ok(store)
    }
}
