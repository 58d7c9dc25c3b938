//! Session token issuance and validation.
//!
//! A session is the `(token, token_expiry)` pair stored on the user's
//! record. Logging in again overwrites the pair, which silently retires
//! the previous token: there is no revocation list, an overwritten token
//! simply stops being findable.
//!
//! ## Token format
//! `<username>_<millis>_<n>`, where `millis` is the issuing [`Tick`] and `n`
//! is drawn from `1000..=9998`. This resists casual guessing only; it is
//! not a cryptographic credential.

use super::store::CredentialStore;
use crate::clock::Tick;
use crate::error::{AccessError, AccessResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::time::Duration;

/// Default session lifetime: 1 hour (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Range of the random token suffix.
const TOKEN_SUFFIX_RANGE: RangeInclusive<u32> = 1000..=9998;

#[derive(Debug)]
pub struct SessionManager {
    ttl: Duration,
    rng: StdRng,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic random component, for tests.
    pub fn with_seed(ttl: Duration, seed: u64) -> Self {
        Self {
            ttl,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `username`, valid until `now + ttl`.
    ///
    /// Any token the user held before is replaced.
    pub fn issue_token(
        &mut self,
        store: &mut CredentialStore,
        username: &str,
        now: Tick,
    ) -> AccessResult<String> {
        if store.find_by_username(username).is_none() {
            return Err(AccessError::NotFound);
        }

        let token = loop {
            let candidate = self.generate_token(username, now);
            // Never hand back the user's current token, and keep live tokens
            // unique across users.
            let taken = store.find_by_token(&candidate).is_some_and(|holder| {
                holder.username == username || holder.has_active_session(now)
            });
            if !taken {
                break candidate;
            }
        };

        let expiry = now.saturating_add(self.ttl);
        store.set_session(username, token.clone(), expiry);
        tracing::debug!(username = username, expiry = %expiry, "Session token issued");
        Ok(token)
    }

    /// Return the username bound to `token` if the session is still active.
    pub fn validate<'a>(
        &self,
        store: &'a CredentialStore,
        token: &str,
        now: Tick,
    ) -> Option<&'a str> {
        store
            .find_by_token(token)
            .filter(|user| user.has_active_session(now))
            .map(|user| user.username.as_str())
    }

    /// [`validate`](Self::validate) as a `Result`, for protected operations.
    pub fn authorize<'a>(
        &self,
        store: &'a CredentialStore,
        token: &str,
        now: Tick,
    ) -> AccessResult<&'a str> {
        self.validate(store, token, now)
            .ok_or(AccessError::Unauthorized)
    }

    fn generate_token(&mut self, username: &str, now: Tick) -> String {
        let suffix = self.rng.gen_range(TOKEN_SUFFIX_RANGE);
        format!("{username}_{now}_{suffix}")
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}
