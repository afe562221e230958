//! Data models for tokens, claims and the logged-in identity.
//!
//! - `RawTokenPair`: the opaque strings as issued
//! - `DecodedClaims<T>`: timestamps plus the subject carried by a token
//! - `Identity`: who is logged in, embedded in the access token
//! - `SessionView`: the read-only snapshot handed to subscribers

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The access/refresh pair exactly as received from the issuer.
///
/// Replaced as a whole, never field by field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl RawTokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens are credentials; keep them out of debug output.
impl std::fmt::Debug for RawTokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawTokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Issued-at and expiry as they appear in a token payload (seconds since epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardClaims {
    pub iat: i64,
    pub exp: i64,
}

/// A decoded token: its lifetime plus whatever subject it carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedClaims<T> {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub subject: T,
}

impl<T> DecodedClaims<T> {
    /// Convert payload seconds into wall-clock timestamps.
    ///
    /// Returns `None` when either timestamp is out of chrono's range.
    pub fn from_standard(claims: StandardClaims, subject: T) -> Option<Self> {
        Some(Self {
            issued_at: Utc.timestamp_opt(claims.iat, 0).single()?,
            expires_at: Utc.timestamp_opt(claims.exp, 0).single()?,
            subject,
        })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DecodedClaims<U> {
        DecodedClaims {
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            subject: f(self.subject),
        }
    }

    /// A token is valid strictly before its expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// The logged-in user, as embedded in the access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub user_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub additional_attributes: Option<serde_json::Value>,
}

impl Identity {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Subject of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSubject {
    pub user_name: String,
}

/// Both tokens of the current pair, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTokens {
    pub access: DecodedClaims<Identity>,
    pub refresh: DecodedClaims<RefreshSubject>,
}

/// A raw pair together with its decoded form. Only ever built when both decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTokens {
    pub raw: RawTokenPair,
    pub decoded: DecodedTokens,
}

/// Public snapshot of the session, handed to subscribers and UI code.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_valid_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_valid_until: Option<DateTime<Utc>>,
}

impl SessionView {
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: &SessionTokens) -> Self {
        Self {
            logged_in: true,
            user: Some(tokens.decoded.access.subject.clone()),
            access_token: Some(tokens.raw.access_token.clone()),
            access_token_valid_until: Some(tokens.decoded.access.expires_at),
            refresh_token: Some(tokens.raw.refresh_token.clone()),
            refresh_token_valid_until: Some(tokens.decoded.refresh.expires_at),
        }
    }
}

/// One of the user's refresh tokens, as returned by the token listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenInfo {
    pub raw: String,
    pub decoded: DecodedClaims<RefreshSubject>,
}

impl RefreshTokenInfo {
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.decoded.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.decoded.expires_at
    }
}

// ============================================================================
// Tests
// ============================================================================
