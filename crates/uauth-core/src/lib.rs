//! uauth-core - client-side session management for uauth issuers.
//!
//! Holds an access/refresh token pair, mirrors it to persistent storage,
//! exposes the decoded identity, and renews tokens on demand before
//! authenticated requests go out.
//!
//! Modules:
//! - `codec`: token payload decoding (no signature checks)
//! - `store`: persistent token slots (file, keychain, memory)
//! - `session`: the authoritative session state and its subscribers
//! - `policy`: when to proceed, renew, or force a new login
//! - `gateway`: the issuer's HTTP endpoints
//! - `request`: authenticated request clients with transparent renewal
//! - `client`: the `AuthClient` facade tying it together

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod policy;
pub mod request;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::AuthClient;
pub use config::{Config, StorageKind};
pub use error::{AuthError, ERR_INVALID_REFRESH_TOKEN, ERR_INVALID_USER};
pub use gateway::{AuthGateway, HttpAuthGateway};
pub use models::{
    DecodedClaims, DecodedTokens, Identity, RawTokenPair, RefreshSubject, RefreshTokenInfo, SessionTokens,
    SessionView,
};
pub use policy::{RenewalAction, RenewalPolicy};
pub use request::{AuthenticatedRequestFactory, RequestClient};
pub use session::{SessionState, Subscriber, Subscription};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, Slot, TokenStore};
