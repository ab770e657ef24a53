//! Failed-login counters and lockout state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a failed-login counter is keyed by. Identity and source IP
/// are tracked independently with different thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AttemptKey {
    Identity(String),
    Ip(String),
}

impl AttemptKey {
    /// Stable storage key, e.g. `identity:ops@acme.example` or
    /// `ip:203.0.113.7`.
    pub fn storage_key(&self) -> String {
        match self {
            AttemptKey::Identity(email) => format!("identity:{email}"),
            AttemptKey::Ip(ip) => format!("ip:{ip}"),
        }
    }
}

/// Rolling-window failure counter. Reset on successful login; a count
/// reaching the key's threshold sets `locked_until`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLoginCounter {
    pub key: AttemptKey,
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}
