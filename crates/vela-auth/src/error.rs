//! Authentication error types.

use thiserror::Error;
use vela_core::error::VelaError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email or password. Identical whether or not the account
    /// exists, to prevent enumeration. Carries the attempts left
    /// before the identity locks, when known.
    #[error("invalid credentials")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    #[error("account locked, retry in {retry_after_secs}s")]
    AccountLocked { retry_after_secs: u64 },

    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    /// The token is blacklisted, its session is gone, or its embedded
    /// `token_version` no longer matches the account.
    #[error("token has been revoked")]
    Revoked,

    #[error("refresh token not recognized")]
    InvalidRefresh,

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for VelaError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Crypto(msg) => VelaError::Crypto(msg),
            other => VelaError::AuthenticationFailed {
                reason: other.to_string(),
            },
        }
    }
}
