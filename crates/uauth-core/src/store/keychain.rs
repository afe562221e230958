use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;

use super::{Slot, StoredToken, TokenStore};
use crate::error::AuthError;

const SERVICE_NAME: &str = "uauth";

/// Token store in the OS keychain, one entry per slot.
///
/// Each entry holds the JSON-encoded token and its expiry.
pub struct KeyringTokenStore {
    service: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringTokenStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, slot: Slot) -> Result<Entry> {
        Entry::new(&self.service, slot.name()).context("Failed to create keyring entry")
    }

    fn read(&self, slot: Slot) -> Result<Option<StoredToken>> {
        match self.entry(slot)?.get_password() {
            Ok(secret) => {
                let stored = serde_json::from_str(&secret)
                    .context("Failed to parse token from keychain")?;
                Ok(Some(stored))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn delete(&self, slot: Slot) -> Result<()> {
        match self.entry(slot)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self, slot: Slot) -> Result<Option<String>, AuthError> {
        let now = Utc::now();
        Ok(self
            .read(slot)?
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.token))
    }

    fn save(&self, slot: Slot, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        let secret = serde_json::to_string(&StoredToken {
            token: token.to_string(),
            expires_at,
        })
        .context("Failed to encode token")?;
        self.entry(slot)?
            .set_password(&secret)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        for slot in Slot::ALL {
            self.delete(slot)?;
        }
        Ok(())
    }
}
