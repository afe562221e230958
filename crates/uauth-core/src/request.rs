//! Authenticated request construction.
//!
//! `AuthenticatedRequestFactory::acquire` runs the renewal policy against the
//! current session, performs at most one renewal round trip, and hands back a
//! `RequestClient` carrying the (possibly renewed) bearer token.
//!
//! Renewals are serialized behind a latch: a caller that finds a renewal
//! already in flight waits for it and re-evaluates against the fresh tokens
//! instead of issuing a second call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::gateway::{AuthGateway, HttpAuthGateway};
use crate::models::SessionTokens;
use crate::policy::{RenewalAction, RenewalPolicy};
use crate::session::SessionState;

/// Default request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// A ready-to-use HTTP client bound to the base URL and, when authenticated,
/// to one access token.
/// Clone is cheap - shares the connection pool.
#[derive(Clone)]
pub struct RequestClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    access_token: Option<String>,
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("authenticated", &self.access_token.is_some())
            .finish()
    }
}

impl RequestClient {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration, access_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            access_token,
        }
    }

    /// The bearer token this client sends, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Value of the `Authorization` header this client sends, if any.
    pub fn authorization(&self) -> Option<String> {
        self.access_token.as_ref().map(|t| format!("Bearer {}", t))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `path` against the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path)).timeout(self.timeout);
        match self.access_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let response = self.get(path).send().await?;
        Self::parse(path, response).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, AuthError> {
        let response = self.post(path).json(body).send().await?;
        Self::parse(path, response).await
    }

    async fn parse<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T, AuthError> {
        let response = HttpAuthGateway::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse JSON response from {path}: {e}")))
    }
}

pub struct AuthenticatedRequestFactory {
    session: Arc<SessionState>,
    gateway: Arc<dyn AuthGateway>,
    policy: RenewalPolicy,
    client: Client,
    base_url: String,
    default_timeout: Duration,
    renewal_latch: Mutex<()>,
}

impl AuthenticatedRequestFactory {
    pub fn new(
        session: Arc<SessionState>,
        gateway: Arc<dyn AuthGateway>,
        client: Client,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            session,
            gateway,
            policy: RenewalPolicy::default(),
            client,
            base_url: base_url.into(),
            default_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            renewal_latch: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Client without any credential.
    pub fn without_auth(&self, timeout: Option<Duration>) -> RequestClient {
        self.client_for(None, timeout)
    }

    /// Produce an authenticated client, renewing tokens first if the policy
    /// asks for it.
    ///
    /// Fails with `SessionExpired` when there is no session, when both tokens
    /// are expired, or when renewal fails; in the last two cases the session
    /// is logged out before returning. The renewal error, if any, is kept as
    /// the `cause`.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<RequestClient, AuthError> {
        let (tokens, action) = self.evaluate()?;
        if !action.needs_network() {
            return Ok(self.client_for(Some(tokens.raw.access_token.clone()), timeout));
        }

        let _latch = self.renewal_latch.lock().await;

        // A renewal may have completed while we waited
        let (tokens, action) = self.evaluate()?;
        let renewed = match action {
            RenewalAction::Proceed => {
                return Ok(self.client_for(Some(tokens.raw.access_token.clone()), timeout));
            }
            // evaluate() already logged out
            RenewalAction::RequireLogin => return Err(AuthError::session_expired(None)),
            RenewalAction::RenewAccessToken => {
                info!("Access token expired, renewing it with the refresh token");
                self.gateway
                    .access_token_from_refresh_token(&tokens.raw.refresh_token)
                    .await
            }
            RenewalAction::RenewRefreshToken => {
                info!("Refresh token past its renewal threshold, renewing it");
                self.gateway.renew_refresh_token(&tokens.raw.refresh_token).await
            }
        };

        let pair = match renewed {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Token renewal failed, logging out");
                self.session.logout();
                return Err(AuthError::session_expired(Some(e)));
            }
        };

        // The session may have been logged out or replaced during the round trip
        match self.session.tokens() {
            Some(current) if Arc::ptr_eq(&current, &tokens) => {}
            Some(current) => {
                debug!("Session replaced during renewal, using the newer tokens");
                return Ok(self.client_for(Some(current.raw.access_token.clone()), timeout));
            }
            None => {
                debug!("Session ended during renewal, discarding renewed tokens");
                return Err(AuthError::session_expired(None));
            }
        }

        let access_token = pair.access_token.clone();
        if let Err(e) = self.session.renew(pair) {
            warn!(error = %e, "Issuer returned undecodable tokens, logging out");
            self.session.logout();
            return Err(AuthError::session_expired(Some(e)));
        }

        Ok(self.client_for(Some(access_token), timeout))
    }

    /// Snapshot the session and classify it. `RequireLogin` is turned into a
    /// logout plus error here so callers only see actionable outcomes.
    fn evaluate(&self) -> Result<(Arc<SessionTokens>, RenewalAction), AuthError> {
        let Some(tokens) = self.session.tokens() else {
            return Err(AuthError::session_expired(None));
        };
        let action = self.policy.evaluate(Some(&tokens.decoded), Utc::now());
        if action == RenewalAction::RequireLogin {
            warn!("Access and refresh token expired, logging out");
            self.session.logout();
            return Err(AuthError::session_expired(None));
        }
        Ok((tokens, action))
    }

    fn client_for(&self, access_token: Option<String>, timeout: Option<Duration>) -> RequestClient {
        RequestClient::new(
            self.client.clone(),
            self.base_url.clone(),
            timeout.unwrap_or(self.default_timeout),
            access_token,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use crate::test_support::{fresh_pair, pair_at, ScriptedGateway};

    fn setup(gateway: ScriptedGateway) -> (AuthenticatedRequestFactory, Arc<SessionState>, Arc<ScriptedGateway>) {
        let session = Arc::new(SessionState::new(Arc::new(MemoryTokenStore::new())));
        let gateway = Arc::new(gateway);
        let factory = AuthenticatedRequestFactory::new(
            Arc::clone(&session),
            gateway.clone(),
            Client::new(),
            "http://issuer.test/uauth",
        );
        (factory, session, gateway)
    }

    /// Access expired, refresh with most of its life ahead.
    fn stale_access_pair(user: &str) -> crate::models::RawTokenPair {
        pair_at(Utc::now(), user, -10, 600, 86_400)
    }

    /// Both valid, refresh with only 10% of its life left.
    fn aging_refresh_pair(user: &str) -> crate::models::RawTokenPair {
        pair_at(Utc::now(), user, 600, 9_000, 1_000)
    }

    // -------------------------------------------------------------------------
    // Proceed
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_valid_tokens_make_no_network_call() {
        let (factory, session, gateway) = setup(ScriptedGateway::default());
        let pair = fresh_pair("alice");
        session.login(pair.clone()).unwrap();

        let client = factory.acquire(None).await.unwrap();
        assert_eq!(client.access_token(), Some(pair.access_token.as_str()));
        assert_eq!(client.authorization(), Some(format!("Bearer {}", pair.access_token)));
        assert_eq!(client.timeout(), Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS));
        assert_eq!(client.base_url(), "http://issuer.test/uauth");
        assert_eq!(gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_timeout_is_applied() {
        let (factory, session, _) = setup(ScriptedGateway::default());
        session.login(fresh_pair("alice")).unwrap();
        let client = factory.acquire(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(1));
    }

    // -------------------------------------------------------------------------
    // Renewal
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_expired_access_renews_once() {
        let renewed = fresh_pair("alice-renewed");
        let (factory, session, gateway) = setup(ScriptedGateway::default().access_ok(renewed.clone()));
        session.login(stale_access_pair("alice")).unwrap();

        let client = factory.acquire(None).await.unwrap();
        assert_eq!(client.access_token(), Some(renewed.access_token.as_str()));
        assert_eq!(gateway.access_calls(), 1);
        assert_eq!(gateway.renew_calls(), 0);
        assert_eq!(session.raw_tokens(), Some(renewed));
    }

    #[tokio::test]
    async fn test_aging_refresh_renews_refresh_token() {
        let renewed = fresh_pair("alice-renewed");
        let (factory, session, gateway) = setup(ScriptedGateway::default().renew_ok(renewed.clone()));
        session.login(aging_refresh_pair("alice")).unwrap();

        let client = factory.acquire(None).await.unwrap();
        assert_eq!(client.access_token(), Some(renewed.access_token.as_str()));
        assert_eq!(gateway.renew_calls(), 1);
        assert_eq!(gateway.access_calls(), 0);
        assert_eq!(session.raw_tokens(), Some(renewed));
    }

    #[tokio::test]
    async fn test_aging_refresh_with_expired_access_makes_one_call() {
        let renewed = fresh_pair("alice-renewed");
        let (factory, session, gateway) = setup(ScriptedGateway::default().renew_ok(renewed.clone()));
        session.login(pair_at(Utc::now(), "alice", -10, 9_000, 1_000)).unwrap();

        factory.acquire(None).await.unwrap();
        assert_eq!(gateway.total_calls(), 1);
        assert_eq!(gateway.renew_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_renews_once() {
        let renewed = fresh_pair("alice-renewed");
        let (factory, session, gateway) = setup(
            ScriptedGateway::default()
                .access_ok(renewed.clone())
                .with_delay(Duration::from_millis(20)),
        );
        session.login(stale_access_pair("alice")).unwrap();

        let (a, b) = tokio::join!(factory.acquire(None), factory.acquire(None));
        assert_eq!(a.unwrap().access_token(), Some(renewed.access_token.as_str()));
        assert_eq!(b.unwrap().access_token(), Some(renewed.access_token.as_str()));
        assert_eq!(gateway.access_calls(), 1);
    }

    // -------------------------------------------------------------------------
    // Failure policy
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_no_session_fails_immediately() {
        let (factory, _, gateway) = setup(ScriptedGateway::default());
        let err = factory.acquire(None).await.expect_err("no session");
        assert!(matches!(err, AuthError::SessionExpired { cause: None }));
        assert_eq!(gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_refresh_logs_out() {
        let (factory, session, gateway) = setup(ScriptedGateway::default());
        session.login(pair_at(Utc::now(), "alice", -100, 7_200, -10)).unwrap();

        let err = factory.acquire(None).await.expect_err("both expired");
        assert!(matches!(err, AuthError::SessionExpired { .. }));
        assert!(!session.is_logged_in());
        assert_eq!(gateway.total_calls(), 0);

        // Already logged out: a second logout changes nothing
        session.logout();
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_invalidated_refresh_token_logs_out() {
        let (factory, session, gateway) =
            setup(ScriptedGateway::default().access_err(|| AuthError::InvalidRefreshToken));
        session.login(stale_access_pair("alice")).unwrap();

        let views = Arc::new(std::sync::Mutex::new(Vec::new()));
        let views_clone = Arc::clone(&views);
        session.subscribe(move |view| views_clone.lock().unwrap().push(view.logged_in));

        let err = factory.acquire(None).await.expect_err("renewal rejected");
        assert!(matches!(err.cause(), Some(AuthError::InvalidRefreshToken)));
        assert!(err.is_session_fatal());
        assert!(!session.is_logged_in());
        assert_eq!(*views.lock().unwrap(), vec![false]);
        assert_eq!(gateway.access_calls(), 1);
    }

    #[tokio::test]
    async fn test_deleted_user_logs_out() {
        let (factory, session, _) = setup(ScriptedGateway::default().renew_err(|| AuthError::InvalidUser));
        session.login(aging_refresh_pair("alice")).unwrap();

        let err = factory.acquire(None).await.expect_err("user gone");
        assert!(matches!(err.cause(), Some(AuthError::InvalidUser)));
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_undecodable_renewal_logs_out() {
        let garbage = crate::models::RawTokenPair::new("garbage", "garbage");
        let (factory, session, _) = setup(ScriptedGateway::default().access_ok(garbage));
        session.login(stale_access_pair("alice")).unwrap();

        let err = factory.acquire(None).await.expect_err("bad tokens");
        assert!(matches!(err.cause(), Some(AuthError::MalformedToken(_))));
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_transport_failure_during_renewal_logs_out() {
        let session = Arc::new(SessionState::new(Arc::new(MemoryTokenStore::new())));
        let gateway = Arc::new(HttpAuthGateway::with_client(Client::new(), "http://127.0.0.1:1/uauth"));
        let factory = AuthenticatedRequestFactory::new(
            Arc::clone(&session),
            gateway,
            Client::new(),
            "http://127.0.0.1:1/uauth",
        );
        session.login(stale_access_pair("alice")).unwrap();

        let err = factory.acquire(None).await.expect_err("issuer unreachable");
        assert!(matches!(err, AuthError::SessionExpired { cause: Some(_) }));
        assert!(err.is_transport());
        assert!(matches!(err.cause(), Some(AuthError::Transport(_))));
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_renewal_is_never_retried() {
        let (factory, session, gateway) =
            setup(ScriptedGateway::default().access_err(|| AuthError::InvalidResponse("boom".into())));
        session.login(stale_access_pair("alice")).unwrap();

        assert!(factory.acquire(None).await.is_err());
        assert_eq!(gateway.access_calls(), 1);

        // Session is gone, so a second attempt fails without touching the network
        assert!(factory.acquire(None).await.is_err());
        assert_eq!(gateway.access_calls(), 1);
    }

    // -------------------------------------------------------------------------
    // RequestClient
    // -------------------------------------------------------------------------

    #[test]
    fn test_request_client_url_joining() {
        let client = RequestClient::new(Client::new(), "http://api.test/", Duration::from_secs(5), None);
        assert_eq!(client.url("/users"), "http://api.test/users");
        assert_eq!(client.url("users"), "http://api.test/users");
        assert_eq!(client.url("https://other.test/x"), "https://other.test/x");
        assert!(client.authorization().is_none());
    }

    #[test]
    fn test_request_builder_carries_bearer() {
        let client = RequestClient::new(
            Client::new(),
            "http://api.test",
            Duration::from_secs(5),
            Some("tok".to_string()),
        );
        let request = client.get("/me").build().unwrap();
        assert_eq!(request.url().as_str(), "http://api.test/me");
        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer tok"
        );
        assert_eq!(request.timeout(), Some(&Duration::from_secs(5)));
    }
}
