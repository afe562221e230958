//! Network boundary to the token issuer.
//!
//! `AuthGateway` is the seam the request factory talks through; the
//! production implementation is `HttpAuthGateway`. Every method makes
//! exactly one round trip and never retries.

pub mod http;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::models::RawTokenPair;

pub use http::HttpAuthGateway;

/// Login endpoint, relative to the configured base URL
pub const LOGIN_PATH: &str = "/login";
pub const ACCESS_TOKEN_FROM_REFRESH_TOKEN_PATH: &str = "/accessTokenFromRefreshToken";
pub const RENEW_REFRESH_TOKEN_PATH: &str = "/renewRefreshToken";
pub const DELETE_REFRESH_TOKEN_PATH: &str = "/deleteRefreshToken";
pub const LIST_REFRESH_TOKENS_PATH: &str = "/listRefreshTokens";

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchange credentials for a fresh pair. Bad credentials surface as
    /// `AuthError::InvalidUser`.
    async fn login(&self, user_name: &str, password: &str) -> Result<RawTokenPair, AuthError>;

    /// Mint a new access token; the issuer may hand back the same refresh token.
    async fn access_token_from_refresh_token(&self, refresh_token: &str) -> Result<RawTokenPair, AuthError>;

    /// Re-issue both tokens, extending the refresh token's lifetime.
    async fn renew_refresh_token(&self, refresh_token: &str) -> Result<RawTokenPair, AuthError>;

    /// Revoke one of the user's refresh tokens.
    async fn delete_refresh_token(&self, access_token: &str, refresh_token: &str) -> Result<(), AuthError>;

    /// Raw refresh tokens currently issued to the caller's identity.
    async fn list_refresh_tokens(&self, access_token: &str) -> Result<Vec<String>, AuthError>;
}
