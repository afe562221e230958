//! Token renewal decisions.
//!
//! Given the decoded pair and the current time, decide what must happen
//! before an authenticated request can go out:
//!
//! | condition                                        | action              |
//! |--------------------------------------------------|---------------------|
//! | no tokens                                        | `RequireLogin`      |
//! | refresh token expired                            | `RequireLogin`      |
//! | refresh remaining / refresh lifetime < threshold | `RenewRefreshToken` |
//! | access token expired                             | `RenewAccessToken`  |
//! | otherwise                                        | `Proceed`           |
//!
//! The refresh threshold is checked before access expiry: renewing the
//! refresh token also yields a new access token, so one round trip covers
//! both.

use chrono::{DateTime, Utc};

use crate::models::DecodedTokens;

/// Fraction of refresh-token lifetime below which it is renewed pre-emptively.
pub const DEFAULT_REFRESH_RENEWAL_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalAction {
    /// Current access token is usable as-is.
    Proceed,
    /// Mint a new access token with the current refresh token.
    RenewAccessToken,
    /// Re-issue both tokens, restarting the refresh token's lifetime.
    RenewRefreshToken,
    /// Nothing usable is left; the session must be torn down.
    RequireLogin,
}

impl RenewalAction {
    pub fn needs_network(self) -> bool {
        matches!(self, RenewalAction::RenewAccessToken | RenewalAction::RenewRefreshToken)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenewalPolicy {
    refresh_renewal_threshold: f64,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            refresh_renewal_threshold: DEFAULT_REFRESH_RENEWAL_THRESHOLD,
        }
    }
}

impl RenewalPolicy {
    /// Policy renewing the refresh token once less than `threshold` of its
    /// lifetime remains. Values are clamped to `0.0..=1.0`; `0.0` disables
    /// pre-emptive renewal. NaN falls back to the default.
    pub fn with_refresh_threshold(threshold: f64) -> Self {
        Self {
            refresh_renewal_threshold: if threshold.is_nan() {
                DEFAULT_REFRESH_RENEWAL_THRESHOLD
            } else {
                threshold.clamp(0.0, 1.0)
            },
        }
    }

    pub fn refresh_renewal_threshold(&self) -> f64 {
        self.refresh_renewal_threshold
    }

    pub fn evaluate(&self, tokens: Option<&DecodedTokens>, now: DateTime<Utc>) -> RenewalAction {
        let Some(tokens) = tokens else {
            return RenewalAction::RequireLogin;
        };

        let refresh = &tokens.refresh;
        if !refresh.is_valid_at(now) {
            return RenewalAction::RequireLogin;
        }

        if self.remaining_fraction(refresh.issued_at, refresh.expires_at, now) < self.refresh_renewal_threshold {
            return RenewalAction::RenewRefreshToken;
        }

        if !tokens.access.is_valid_at(now) {
            return RenewalAction::RenewAccessToken;
        }

        RenewalAction::Proceed
    }

    /// Share of a token's lifetime still ahead of `now`.
    fn remaining_fraction(&self, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let total = (expires_at - issued_at).num_milliseconds();
        if total <= 0 {
            // Degenerate lifetime: nothing sensible to wait for
            return 0.0;
        }
        let remaining = (expires_at - now).num_milliseconds();
        remaining as f64 / total as f64
    }
}

// ============================================================================
// Tests
// ============================================================================
