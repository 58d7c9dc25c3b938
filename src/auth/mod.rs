//! User credentials and session tokens.
//!
//! Provides:
//! - User registration with username/password (minimum 3 characters each)
//! - Session tokens bound to one user with an absolute expiry
//! - Token-based authorization for protected resources
//!
//! ## Design Decisions
//! - Plain owned structures, passed by reference into the dispatcher. The
//!   service processes one request at a time, so nothing here is locked.
//! - One active session per user: a new login overwrites the old token.

pub mod session;
pub mod store;

pub use session::{SessionManager, DEFAULT_SESSION_TTL_SECS};
pub use store::{CredentialStore, UserRecord, MIN_FIELD_CHARS};
