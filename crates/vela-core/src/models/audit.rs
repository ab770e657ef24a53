//! Audit log domain model.
//!
//! Entries form a hash chain: each `entry_hash` covers the previous
//! entry's hash plus the entry's own canonical serialization, so any
//! retroactive edit breaks every hash after it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable, chained audit record. Never updated or deleted once
/// written; the storage grants enforce this, not just convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// Monotonic position in the chain, starting at 1.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    /// `Uuid::nil()` when the actor is unknown (e.g. a failed login
    /// against a nonexistent account) or external (webhooks).
    pub actor_id: Uuid,
    pub tenant_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub success: bool,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// Input for appending to the chain. Sequence number, timestamp and
/// hashes are assigned by the chain itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditEntry {
    pub actor_id: Uuid,
    pub tenant_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub success: bool,
}
