//! The authoritative in-memory session.
//!
//! `SessionState` owns the current token pair and its decoded form. The two
//! only ever change together: a pair that fails to decode is rejected before
//! anything is replaced. Every transition is mirrored to the token store and
//! then announced to subscribers, in registration order, before the
//! transition method returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::AuthError;
use crate::models::{DecodedTokens, Identity, RawTokenPair, SessionTokens, SessionView};
use crate::store::{Slot, TokenStore};

/// Observer invoked on every transition with the new public view.
///
/// Subscribers run while the transition lock is held; starting another
/// transition (`login`, `renew`, `logout`) from inside one deadlocks.
pub type Subscriber = Arc<dyn Fn(&SessionView) + Send + Sync>;

type SubscriberList = Mutex<Vec<(u64, Subscriber)>>;

fn lock_list(list: &SubscriberList) -> MutexGuard<'_, Vec<(u64, Subscriber)>> {
    list.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle returned by [`SessionState::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    list: Weak<SubscriberList>,
}

impl Subscription {
    /// Remove the subscriber. Further calls are no-ops, and calling this from
    /// inside a notification is allowed.
    pub fn unsubscribe(&self) {
        if let Some(list) = self.list.upgrade() {
            lock_list(&list).retain(|(id, _)| *id != self.id);
        }
    }
}

/// Snapshot of what the token store currently holds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

pub struct SessionState {
    /// Serializes transitions together with their notifications.
    transition: Mutex<()>,
    tokens: RwLock<Option<Arc<SessionTokens>>>,
    store: Arc<dyn TokenStore>,
    subscribers: Arc<SubscriberList>,
    next_subscriber_id: AtomicU64,
}

impl SessionState {
    /// Create an empty (logged-out) session persisting to `store`.
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            transition: Mutex::new(()),
            tokens: RwLock::new(None),
            store,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Read both slots of the token store without touching the session.
    pub fn read_persisted(&self) -> Result<PersistedTokens, AuthError> {
        Ok(PersistedTokens {
            access_token: self.store.load(Slot::Access)?,
            refresh_token: self.store.load(Slot::Refresh)?,
        })
    }

    // ===== Transitions =====

    /// Install a freshly issued pair.
    ///
    /// Fails with `MalformedToken` if either token does not decode; the
    /// previous state is kept in that case.
    pub fn login(&self, raw: RawTokenPair) -> Result<(), AuthError> {
        let user = self.replace(raw)?;
        info!(user = %user, "Logged in");
        Ok(())
    }

    /// Install a pair obtained from a renewal call. Same guarantees as `login`.
    pub fn renew(&self, raw: RawTokenPair) -> Result<(), AuthError> {
        let user = self.replace(raw)?;
        debug!(user = %user, "Session renewed");
        Ok(())
    }

    /// Drop the session and the persisted slots. Safe to call when logged out;
    /// subscribers are notified either way.
    pub fn logout(&self) {
        let _transition = self.lock_transition();
        let previous = {
            let mut current = self.write_tokens();
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear persisted tokens");
            }
            current.take()
        };
        if let Some(previous) = previous {
            info!(user = %previous.decoded.access.subject.user_name, "Logged out");
        }
        self.notify(&SessionView::logged_out());
    }

    fn replace(&self, raw: RawTokenPair) -> Result<String, AuthError> {
        let decoded = codec::decode_pair(&raw)?;
        let tokens = Arc::new(SessionTokens { raw, decoded });

        let _transition = self.lock_transition();
        {
            let mut current = self.write_tokens();
            self.persist(&tokens);
            *current = Some(Arc::clone(&tokens));
        }

        self.notify(&SessionView::from_tokens(&tokens));
        Ok(tokens.decoded.access.subject.user_name.clone())
    }

    fn persist(&self, tokens: &SessionTokens) {
        let slots = [
            (Slot::Access, &tokens.raw.access_token, tokens.decoded.access.expires_at),
            (Slot::Refresh, &tokens.raw.refresh_token, tokens.decoded.refresh.expires_at),
        ];
        for (slot, token, expires_at) in slots {
            if let Err(e) = self.store.save(slot, token, expires_at) {
                warn!(slot = slot.name(), error = %e, "Failed to persist token");
            }
        }
    }

    // ===== Subscriptions =====

    /// Register an observer called synchronously after every transition.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&SessionView) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        lock_list(&self.subscribers).push((id, Arc::new(f)));
        Subscription {
            id,
            list: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock_list(&self.subscribers).len()
    }

    fn notify(&self, view: &SessionView) {
        // Callbacks run without the lock held so they may (un)subscribe
        let snapshot: Vec<(u64, Subscriber)> = lock_list(&self.subscribers).clone();
        for (id, subscriber) in snapshot {
            let still_registered = lock_list(&self.subscribers).iter().any(|(other, _)| *other == id);
            if still_registered {
                subscriber(view);
            }
        }
    }

    // ===== Accessors =====

    /// Current tokens, raw and decoded. The snapshot never changes after
    /// it is returned.
    pub fn tokens(&self) -> Option<Arc<SessionTokens>> {
        self.tokens.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn raw_tokens(&self) -> Option<RawTokenPair> {
        self.tokens().map(|t| t.raw.clone())
    }

    pub fn decoded(&self) -> Option<DecodedTokens> {
        self.tokens().map(|t| t.decoded.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.tokens().is_some()
    }

    pub fn user(&self) -> Option<Identity> {
        self.tokens().map(|t| t.decoded.access.subject.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens().map(|t| t.raw.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tokens().map(|t| t.raw.refresh_token.clone())
    }

    pub fn access_token_valid_until(&self) -> Option<DateTime<Utc>> {
        self.tokens().map(|t| t.decoded.access.expires_at)
    }

    pub fn refresh_token_valid_until(&self) -> Option<DateTime<Utc>> {
        self.tokens().map(|t| t.decoded.refresh.expires_at)
    }

    pub fn view(&self) -> SessionView {
        match self.tokens() {
            Some(tokens) => SessionView::from_tokens(&tokens),
            None => SessionView::logged_out(),
        }
    }

    fn lock_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_tokens(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<SessionTokens>>> {
        self.tokens.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
