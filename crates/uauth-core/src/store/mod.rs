//! Persistent token storage.
//!
//! Two fixed slots (access, refresh), each stored with its token's own
//! expiry. An expired or missing entry reads back as absent, and absence of
//! either slot means logged out for that slot.
//!
//! Backends:
//! - `MemoryTokenStore`: in-process only
//! - `FileTokenStore`: JSON file in the cache directory
//! - `KeyringTokenStore`: OS keychain

pub mod file;
pub mod keychain;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

pub use file::FileTokenStore;
pub use keychain::KeyringTokenStore;
pub use memory::MemoryTokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Access,
    Refresh,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Access, Slot::Refresh];

    /// Entry name, shared by every backend.
    pub fn name(self) -> &'static str {
        match self {
            Slot::Access => "uauth-access-token",
            Slot::Refresh => "uauth-refresh-token",
        }
    }
}

/// One slot's content: the raw token and when the entry stops being readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

pub trait TokenStore: Send + Sync {
    /// Read a slot. Expired entries are reported as `None`.
    fn load(&self, slot: Slot) -> Result<Option<String>, AuthError>;

    /// Write a slot, replacing any previous entry.
    fn save(&self, slot: Slot, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError>;

    /// Remove both slots.
    fn clear(&self) -> Result<(), AuthError>;
}
