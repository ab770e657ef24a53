//! Session domain model and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a session.
///
/// `Active --rotate--> Superseded`, `Active --revoke--> Revoked`.
/// `Superseded` and `Revoked` are terminal. A refresh token presented
/// against a `Superseded` session was already rotated once — that is
/// the token-theft signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Superseded,
    Revoked,
}

/// Why a session left the `Active` state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RevokeReason {
    Logout,
    LogoutAll,
    PasswordChange,
    Expired,
    /// A new login from the same device replaced this session.
    Replaced,
    /// Rotated refresh token was presented again.
    TheftSuspected,
}

/// One session per device. The refresh token is never stored raw;
/// only its SHA-256 hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    /// SHA-256 over `ip ‖ user_agent`; identifies the device.
    pub device_fingerprint: String,
    pub ip_address: String,
    pub user_agent: String,
    pub state: SessionState,
    pub revoke_reason: Option<RevokeReason>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub tenant_id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub device_fingerprint: String,
    pub ip_address: String,
    pub user_agent: String,
    pub expires_at: DateTime<Utc>,
}

/// What the device-management endpoints show the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// True for the session the request itself was authenticated with.
    pub current: bool,
}
