//! Token blacklist domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a token hash was blacklisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlacklistReason {
    Logout,
    LogoutAll,
    PasswordChange,
    /// Refresh rotation consumed the token.
    Rotated,
    TheftSuspected,
}

/// A blacklisted token must never validate, even if its signature and
/// claims are otherwise valid. Entries are purged once `expires_at`
/// passes — a token past its own expiry rejects itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub token_hash: String,
    pub reason: BlacklistReason,
    pub expires_at: DateTime<Utc>,
}
