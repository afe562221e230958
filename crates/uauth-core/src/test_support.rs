//! Fixture builders shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::codec::encode_unsigned;
use crate::error::AuthError;
use crate::gateway::AuthGateway;
use crate::models::RawTokenPair;

pub(crate) fn access_token(user_name: &str, iat: DateTime<Utc>, exp: DateTime<Utc>) -> String {
    encode_unsigned(&json!({
        "claims": {"iat": iat.timestamp(), "exp": exp.timestamp()},
        "user": {
            "id": format!("id-{user_name}"),
            "userName": user_name,
            "firstName": "Test",
            "lastName": "User",
            "permissions": ["tokens.list"],
            "roles": ["user"]
        }
    }))
}

pub(crate) fn refresh_token(user_name: &str, iat: DateTime<Utc>, exp: DateTime<Utc>) -> String {
    encode_unsigned(&json!({
        "claims": {"iat": iat.timestamp(), "exp": exp.timestamp()},
        "userName": user_name
    }))
}

/// A pair whose access token expires `access_secs` from now and whose refresh
/// token was issued `refresh_age_secs` ago and expires `refresh_secs` from now.
pub(crate) fn pair_at(
    now: DateTime<Utc>,
    user_name: &str,
    access_secs: i64,
    refresh_age_secs: i64,
    refresh_secs: i64,
) -> RawTokenPair {
    RawTokenPair::new(
        access_token(
            user_name,
            now - Duration::seconds(60),
            now + Duration::seconds(access_secs),
        ),
        refresh_token(
            user_name,
            now - Duration::seconds(refresh_age_secs),
            now + Duration::seconds(refresh_secs),
        ),
    )
}

/// Access valid for 15 minutes, refresh freshly issued for a day.
pub(crate) fn fresh_pair(user_name: &str) -> RawTokenPair {
    pair_at(Utc::now(), user_name, 900, 60, 86_400)
}

type Reply = Arc<dyn Fn() -> Result<RawTokenPair, AuthError> + Send + Sync>;
type UnitReply = Arc<dyn Fn() -> Result<(), AuthError> + Send + Sync>;

/// In-memory issuer that answers from a script and counts calls.
/// Unscripted calls fail with `InvalidResponse`.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    login: Option<Reply>,
    access: Option<Reply>,
    renew: Option<Reply>,
    delete: Option<UnitReply>,
    refresh_tokens: Vec<String>,
    list_error: Option<Arc<dyn Fn() -> AuthError + Send + Sync>>,
    delay: Option<std::time::Duration>,
    login_calls: AtomicUsize,
    access_calls: AtomicUsize,
    renew_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    list_calls: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

fn ok(pair: RawTokenPair) -> Reply {
    Arc::new(move || Ok(pair.clone()))
}

fn unscripted(what: &str) -> AuthError {
    AuthError::InvalidResponse(format!("unscripted {what} call"))
}

impl ScriptedGateway {
    pub(crate) fn login_ok(mut self, pair: RawTokenPair) -> Self {
        self.login = Some(ok(pair));
        self
    }

    pub(crate) fn login_err(mut self, f: impl Fn() -> AuthError + Send + Sync + 'static) -> Self {
        self.login = Some(Arc::new(move || Err(f())));
        self
    }

    pub(crate) fn access_ok(mut self, pair: RawTokenPair) -> Self {
        self.access = Some(ok(pair));
        self
    }

    pub(crate) fn access_err(mut self, f: impl Fn() -> AuthError + Send + Sync + 'static) -> Self {
        self.access = Some(Arc::new(move || Err(f())));
        self
    }

    pub(crate) fn renew_ok(mut self, pair: RawTokenPair) -> Self {
        self.renew = Some(ok(pair));
        self
    }

    pub(crate) fn renew_err(mut self, f: impl Fn() -> AuthError + Send + Sync + 'static) -> Self {
        self.renew = Some(Arc::new(move || Err(f())));
        self
    }

    pub(crate) fn delete_ok(mut self) -> Self {
        self.delete = Some(Arc::new(|| Ok(())));
        self
    }

    pub(crate) fn delete_err(mut self, f: impl Fn() -> AuthError + Send + Sync + 'static) -> Self {
        self.delete = Some(Arc::new(move || Err(f())));
        self
    }

    pub(crate) fn with_refresh_tokens(mut self, tokens: Vec<String>) -> Self {
        self.refresh_tokens = tokens;
        self
    }

    pub(crate) fn list_err(mut self, f: impl Fn() -> AuthError + Send + Sync + 'static) -> Self {
        self.list_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn access_calls(&self) -> usize {
        self.access_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Renewal calls only (login excluded).
    pub(crate) fn total_calls(&self) -> usize {
        self.access_calls() + self.renew_calls()
    }

    pub(crate) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl AuthGateway for ScriptedGateway {
    async fn login(&self, _user_name: &str, _password: &str) -> Result<RawTokenPair, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.login.as_ref().map_or_else(|| Err(unscripted("login")), |f| f())
    }

    async fn access_token_from_refresh_token(&self, _refresh_token: &str) -> Result<RawTokenPair, AuthError> {
        self.access_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.access.as_ref().map_or_else(|| Err(unscripted("access")), |f| f())
    }

    async fn renew_refresh_token(&self, _refresh_token: &str) -> Result<RawTokenPair, AuthError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.renew.as_ref().map_or_else(|| Err(unscripted("renew")), |f| f())
    }

    async fn delete_refresh_token(&self, _access_token: &str, refresh_token: &str) -> Result<(), AuthError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let result = self.delete.as_ref().map_or_else(|| Err(unscripted("delete")), |f| f());
        if result.is_ok() {
            self.deleted.lock().unwrap().push(refresh_token.to_string());
        }
        result
    }

    async fn list_refresh_tokens(&self, _access_token: &str) -> Result<Vec<String>, AuthError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        match &self.list_error {
            Some(f) => Err(f()),
            None => Ok(self.refresh_tokens.clone()),
        }
    }
}
