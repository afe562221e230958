use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{Slot, StoredToken, TokenStore};
use crate::error::AuthError;

/// Token store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<Slot, StoredToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<Slot, StoredToken>> {
        // A poisoned map still holds consistent entries
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, slot: Slot) -> Result<Option<String>, AuthError> {
        let now = Utc::now();
        Ok(self
            .entries()
            .get(&slot)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.token.clone()))
    }

    fn save(&self, slot: Slot, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        self.entries().insert(
            slot,
            StoredToken {
                token: token.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        self.entries().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_save_and_load() {
        let store = MemoryTokenStore::new();
        store
            .save(Slot::Access, "abc", Utc::now() + Duration::minutes(5))
            .unwrap();
        assert_eq!(store.load(Slot::Access).unwrap().as_deref(), Some("abc"));
        assert_eq!(store.load(Slot::Refresh).unwrap(), None);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let store = MemoryTokenStore::new();
        store
            .save(Slot::Refresh, "old", Utc::now() - Duration::seconds(1))
            .unwrap();
        assert_eq!(store.load(Slot::Refresh).unwrap(), None);
    }

    #[test]
    fn test_clear_removes_both_slots() {
        let store = MemoryTokenStore::new();
        let exp = Utc::now() + Duration::minutes(5);
        store.save(Slot::Access, "a", exp).unwrap();
        store.save(Slot::Refresh, "r", exp).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load(Slot::Access).unwrap(), None);
        assert_eq!(store.load(Slot::Refresh).unwrap(), None);
    }
}
