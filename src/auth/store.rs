//! In-memory credential store.
//!
//! One [`UserRecord`] per username, each carrying the user's current
//! session token and its expiry. Records live for the whole process; the
//! device keeps no persistent storage.

use crate::clock::Tick;
use crate::error::{AccessError, AccessResult};
use std::collections::HashMap;

/// Minimum length, in characters, of a username and of a password.
pub const MIN_FIELD_CHARS: usize = 3;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    /// Opaque credential, compared as-is.
    pub password: String,
    /// Current session token; empty until the first login.
    pub token: String,
    /// Instant from which `token` stops being accepted.
    pub token_expiry: Tick,
}

impl UserRecord {
    fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            token: String::new(),
            token_expiry: Tick::ZERO,
        }
    }

    /// A session is active while the token is set and `now` is before its expiry.
    pub fn has_active_session(&self, now: Tick) -> bool {
        !self.token.is_empty() && now < self.token_expiry
    }
}

/// Username → [`UserRecord`] map.
#[derive(Debug, Default)]
pub struct CredentialStore {
    users: HashMap<String, UserRecord>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── User Management ─────────────────────────────────────────────

    /// Register a new user with no session.
    pub fn register(&mut self, username: &str, password: &str) -> AccessResult<()> {
        if username.chars().count() < MIN_FIELD_CHARS || password.chars().count() < MIN_FIELD_CHARS
        {
            return Err(AccessError::InvalidInput);
        }
        if self.users.contains_key(username) {
            return Err(AccessError::DuplicateUser);
        }

        self.users
            .insert(username.to_string(), UserRecord::new(username, password));
        Ok(())
    }

    /// Check a username + password pair and return the matching record.
    pub fn authenticate(&self, username: &str, password: &str) -> AccessResult<&UserRecord> {
        let user = self.users.get(username).ok_or(AccessError::NotFound)?;
        if !constant_time_eq(user.password.as_bytes(), password.as_bytes()) {
            return Err(AccessError::WrongCredential);
        }
        Ok(user)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    /// Look up the record currently holding `token`.
    ///
    /// Linear scan: the store holds tens of users at most. The empty
    /// string never matches, so users who have not logged in are not
    /// reachable through it.
    pub fn find_by_token(&self, token: &str) -> Option<&UserRecord> {
        if token.is_empty() {
            return None;
        }
        self.users.values().find(|user| user.token == token)
    }

    /// `false` for unknown users as well as for a wrong password.
    pub fn check_password(&self, username: &str, password: &str) -> bool {
        self.authenticate(username, password).is_ok()
    }

    // ── Session Binding ─────────────────────────────────────────────

    /// Replace the user's token and expiry. Returns `false` if the user
    /// does not exist.
    pub fn set_session(&mut self, username: &str, token: String, expiry: Tick) -> bool {
        match self.users.get_mut(username) {
            Some(user) => {
                user.token = token;
                user.token_expiry = expiry;
                true
            }
            None => false,
        }
    }

    /// Count registered users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ── Tests ───────────────────────────────────────────────────────────
