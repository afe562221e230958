use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Slot, StoredToken, TokenStore};
use crate::error::AuthError;

/// Token file name in cache directory
pub const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access: Option<StoredToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh: Option<StoredToken>,
}

impl TokenFile {
    fn slot_mut(&mut self, slot: Slot) -> &mut Option<StoredToken> {
        match slot {
            Slot::Access => &mut self.access,
            Slot::Refresh => &mut self.refresh,
        }
    }

    fn slot(&self, slot: Slot) -> Option<&StoredToken> {
        match slot {
            Slot::Access => self.access.as_ref(),
            Slot::Refresh => self.refresh.as_ref(),
        }
    }
}

/// Token store backed by a JSON file holding both slots.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Store at `<dir>/tokens.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(TOKEN_FILE))
    }

    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<TokenFile> {
        if !self.path.exists() {
            return Ok(TokenFile::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read token file")?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn write(&self, file: &TokenFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(file)?;
        std::fs::write(&self.path, contents).context("Failed to write token file")?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut TokenFile)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.read()?;
        f(&mut file);
        self.write(&file)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, slot: Slot) -> Result<Option<String>, AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let file = self.read()?;
        let now = Utc::now();
        Ok(file
            .slot(slot)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.token.clone()))
    }

    fn save(&self, slot: Slot, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        self.update(|file| {
            *file.slot_mut(slot) = Some(StoredToken {
                token: token.to_string(),
                expires_at,
            });
        })?;
        debug!(slot = slot.name(), %expires_at, "Token saved to file");
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}
