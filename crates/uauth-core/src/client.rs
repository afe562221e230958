//! High-level entry point for applications.
//!
//! `AuthClient` wires a `SessionState`, an `AuthGateway` and the request
//! factory together and exposes the operations UI code needs: logging in
//! and out, restoring a persisted session, managing refresh tokens and
//! building authenticated request clients.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::Config;
use crate::error::AuthError;
use crate::gateway::{AuthGateway, HttpAuthGateway};
use crate::models::{Identity, RawTokenPair, RefreshTokenInfo, SessionView};
use crate::policy::RenewalPolicy;
use crate::request::{AuthenticatedRequestFactory, RequestClient};
use crate::session::{SessionState, Subscription};

pub struct AuthClient {
    session: Arc<SessionState>,
    gateway: Arc<dyn AuthGateway>,
    factory: AuthenticatedRequestFactory,
}

impl AuthClient {
    pub fn new(
        session: Arc<SessionState>,
        gateway: Arc<dyn AuthGateway>,
        client: Client,
        base_url: impl Into<String>,
    ) -> Self {
        let factory = AuthenticatedRequestFactory::new(Arc::clone(&session), Arc::clone(&gateway), client, base_url);
        Self {
            session,
            gateway,
            factory,
        }
    }

    /// Build a client talking HTTP to the configured issuer, persisting to
    /// the configured store. The session starts logged out; call `restore`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let base_url = config.base_url()?.to_string();
        let client = Client::builder().timeout(config.timeout()).build()?;
        let gateway = Arc::new(HttpAuthGateway::with_client(client.clone(), base_url.clone()));
        let session = Arc::new(SessionState::new(config.token_store()?));
        let mut auth = Self::new(session, gateway, client, base_url);
        auth.factory = auth.factory.with_default_timeout(config.timeout());
        Ok(auth)
    }

    pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
        self.factory = self.factory.with_policy(policy);
        self
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    // ===== Session lifecycle =====

    /// Pick up a session persisted by an earlier run.
    ///
    /// With both slots present the pair is installed directly. With only the
    /// refresh slot left, one access-token renewal is attempted. Failures
    /// leave the session logged out and are not raised. Returns whether a
    /// session is active afterwards.
    pub async fn restore(&self) -> bool {
        let persisted = match self.session.read_persisted() {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted tokens");
                return false;
            }
        };

        match (persisted.access_token, persisted.refresh_token) {
            (Some(access), Some(refresh)) => {
                debug!("Restoring session from persisted tokens");
                if let Err(e) = self.session.login(RawTokenPair::new(access, refresh)) {
                    warn!(error = %e, "Persisted tokens are unusable, discarding them");
                    self.session.logout();
                }
            }
            (None, Some(refresh)) => {
                debug!("Only a refresh token was persisted, renewing access token");
                let result = match self.gateway.access_token_from_refresh_token(&refresh).await {
                    Ok(pair) => self.session.login(pair),
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    warn!(error = %e, "Failed to restore session from refresh token");
                    if e.is_session_fatal() || matches!(e, AuthError::MalformedToken(_)) {
                        self.session.logout();
                    }
                }
            }
            _ => debug!("No persisted session"),
        }

        self.session.is_logged_in()
    }

    /// Log in with credentials. On failure the error is returned as the
    /// issuer reported it and the session is left untouched.
    pub async fn login(&self, user_name: &str, password: &str) -> Result<Identity, AuthError> {
        let pair = self.gateway.login(user_name, password).await.inspect_err(|e| {
            debug!(user = user_name, error = %e, "Login rejected");
        })?;
        self.session.login(pair).map_err(|e| match e {
            AuthError::MalformedToken(reason) => {
                AuthError::InvalidResponse(format!("Issuer returned an undecodable token: {reason}"))
            }
            other => other,
        })?;
        self.session.user().ok_or(AuthError::NotLoggedIn)
    }

    /// Revoke the current refresh token at the issuer and end the session.
    ///
    /// The local session is always cleared, even when the remote call fails;
    /// the remote error is returned afterwards.
    pub async fn logout(&self) -> Result<(), AuthError> {
        if !self.session.is_logged_in() {
            self.session.logout();
            return Ok(());
        }

        let remote = self.delete_current_refresh_token().await;
        self.session.logout();
        match remote {
            Ok(()) => Ok(()),
            // Nothing left to revoke remotely
            Err(AuthError::SessionExpired { cause: None }) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to revoke refresh token during logout");
                Err(e)
            }
        }
    }

    async fn delete_current_refresh_token(&self) -> Result<(), AuthError> {
        let request = self.factory.acquire(None).await?;
        // Renewal inside acquire may have replaced the refresh token
        let refresh = self.session.refresh_token().ok_or(AuthError::NotLoggedIn)?;
        let access = request.access_token().ok_or(AuthError::NotLoggedIn)?;
        self.settle(self.gateway.delete_refresh_token(access, &refresh).await)
    }

    /// Issuer-reported semantic errors end the session before they reach the caller.
    fn settle<T>(&self, result: Result<T, AuthError>) -> Result<T, AuthError> {
        if let Err(e @ (AuthError::InvalidUser | AuthError::InvalidRefreshToken)) = &result {
            info!(error = %e, "Issuer rejected the session, logging out");
            self.session.logout();
        }
        result
    }

    // ===== Refresh token management =====

    /// Revoke any of the user's refresh tokens. Revoking the one this
    /// session runs on logs out.
    pub async fn delete_refresh_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        let request = self.factory.acquire(None).await?;
        let access = request.access_token().ok_or(AuthError::NotLoggedIn)?;
        self.settle(self.gateway.delete_refresh_token(access, refresh_token).await)?;

        if self.session.refresh_token().as_deref() == Some(refresh_token) {
            info!("Deleted the current refresh token, logging out");
            self.session.logout();
        }
        Ok(())
    }

    /// All refresh tokens issued to the logged-in user, decoded.
    ///
    /// Tokens that fail to decode are skipped.
    pub async fn list_refresh_tokens(&self) -> Result<Vec<RefreshTokenInfo>, AuthError> {
        let request = self.factory.acquire(None).await?;
        let access = request.access_token().ok_or(AuthError::NotLoggedIn)?;
        let raw_tokens = self.settle(self.gateway.list_refresh_tokens(access).await)?;

        Ok(raw_tokens
            .into_iter()
            .filter_map(|raw| match codec::decode_refresh(&raw) {
                Ok(decoded) => Some(RefreshTokenInfo { raw, decoded }),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable refresh token");
                    None
                }
            })
            .collect())
    }

    // ===== Requests =====

    /// Authenticated client; see [`AuthenticatedRequestFactory::acquire`].
    pub async fn request(&self, timeout: Option<Duration>) -> Result<RequestClient, AuthError> {
        self.factory.acquire(timeout).await
    }

    pub fn request_without_auth(&self, timeout: Option<Duration>) -> RequestClient {
        self.factory.without_auth(timeout)
    }

    // ===== Read surface =====

    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    pub fn user(&self) -> Option<Identity> {
        self.session.user()
    }

    pub fn view(&self) -> SessionView {
        self.session.view()
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&SessionView) + Send + Sync + 'static,
    {
        self.session.subscribe(f)
    }
}

// ============================================================================
// Tests
// ============================================================================
