//! Error kinds produced by the access-control core.
//!
//! The `Display` text of every variant is the reason string placed after
//! `ERROR:` on the wire, so callers can format a rejection with
//! `format!("ERROR:{err}")`.

use thiserror::Error;

/// Why a request was rejected.
///
/// Every variant is raised before any state is touched, so a rejected
/// request leaves the credential store, the ledger and the actuator as
/// they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Username or password shorter than the minimum length.
    #[error("Min 3 chars")]
    InvalidInput,

    /// Registration for a username that is already taken.
    #[error("User exists")]
    DuplicateUser,

    /// Login for a username that was never registered.
    #[error("User not found")]
    NotFound,

    /// Login with a password that does not match.
    #[error("Wrong password")]
    WrongCredential,

    /// Missing, unknown, superseded or expired session token.
    #[error("Invalid token")]
    Unauthorized,

    /// Payload does not have the shape the resource expects.
    #[error("Invalid format")]
    InvalidFormat,

    /// Actuator state literal other than `0` or `1`.
    #[error("Invalid state")]
    InvalidState,
}

pub type AccessResult<T> = std::result::Result<T, AccessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_reasons() {
        let cases = [
            (AccessError::InvalidInput, "Min 3 chars"),
            (AccessError::DuplicateUser, "User exists"),
            (AccessError::NotFound, "User not found"),
            (AccessError::WrongCredential, "Wrong password"),
            (AccessError::Unauthorized, "Invalid token"),
            (AccessError::InvalidFormat, "Invalid format"),
            (AccessError::InvalidState, "Invalid state"),
        ];
        for (err, reason) in cases {
            assert_eq!(err.to_string(), reason);
        }
    }

    #[test]
    fn wire_format_prefixes_error() {
        assert_eq!(
            format!("ERROR:{}", AccessError::Unauthorized),
            "ERROR:Invalid token"
        );
    }
}
