//! Token decoding.
//!
//! Tokens are JWT-shaped (`header.payload.signature`). Only the payload is
//! read; signatures are never checked because the issuer is trusted. Expiry
//! is reported as data, so an expired token still decodes.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::AuthError;
use crate::models::{DecodedClaims, DecodedTokens, Identity, RawTokenPair, RefreshSubject, StandardClaims};

/// Payload layout shared by access and refresh tokens.
#[derive(Deserialize)]
struct Payload<T> {
    claims: StandardClaims,
    #[serde(flatten)]
    body: T,
}

#[derive(Deserialize)]
struct AccessBody {
    user: Identity,
}

/// Decode a token's payload into claims with subject `T`.
///
/// `T` is deserialized from the payload fields next to `claims`.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<DecodedClaims<T>, AuthError> {
    let mut segments = raw.split('.');
    let payload_b64 = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(header), Some(payload), Some(_signature), None) if !header.is_empty() && !payload.is_empty() => {
            payload
        }
        _ => return Err(AuthError::MalformedToken("expected three dot-separated segments".into())),
    };

    // Some issuers pad the segments; accept both forms.
    let bytes = if payload_b64.ends_with('=') {
        URL_SAFE.decode(payload_b64)
    } else {
        URL_SAFE_NO_PAD.decode(payload_b64)
    }
    .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let payload: Payload<T> = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("invalid payload: {e}")))?;

    DecodedClaims::from_standard(payload.claims, payload.body)
        .ok_or_else(|| AuthError::MalformedToken("timestamp out of range".into()))
}

/// Decode an access token; its subject is the logged-in identity.
pub fn decode_access(raw: &str) -> Result<DecodedClaims<Identity>, AuthError> {
    decode::<AccessBody>(raw).map(|claims| claims.map(|body| body.user))
}

/// Decode a refresh token.
pub fn decode_refresh(raw: &str) -> Result<DecodedClaims<RefreshSubject>, AuthError> {
    decode::<RefreshSubject>(raw)
}

/// Decode both tokens of a pair; fails if either one is malformed.
pub fn decode_pair(raw: &RawTokenPair) -> Result<DecodedTokens, AuthError> {
    Ok(DecodedTokens {
        access: decode_access(&raw.access_token)?,
        refresh: decode_refresh(&raw.refresh_token)?,
    })
}

/// Build an unsigned token around `payload`. Test fixtures only.
#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

// ============================================================================
// Tests
// ============================================================================
