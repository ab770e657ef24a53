//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped repositories
//! require a `tenant_id` parameter to enforce data isolation; the
//! blacklist and failed-login stores are keyed by token hash and
//! attempt key, which are globally unique.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::VelaResult;
use crate::models::{
    audit::AuditEntry,
    blacklist::BlacklistEntry,
    consent::{BankConsent, ConsentUpdate},
    lockout::{AttemptKey, FailedLoginCounter},
    principal::{Account, CreateAccount},
    session::{CreateSession, RevokeReason, Session},
    shipment::{CreateShipment, Shipment, UpdateShipment},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Accounts (tenant-scoped)
// ---------------------------------------------------------------------------

pub trait AccountRepository: Send + Sync {
    fn create(&self, input: CreateAccount) -> impl Future<Output = VelaResult<Account>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = VelaResult<Account>> + Send;
    fn get_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> impl Future<Output = VelaResult<Account>> + Send;
    /// Replace the password hash and bump `token_version` in one
    /// write, so every previously issued access token is rejected from
    /// this point on.
    fn update_password(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        password_hash: String,
    ) -> impl Future<Output = VelaResult<Account>> + Send;
}

// ---------------------------------------------------------------------------
// Sessions (tenant-scoped)
// ---------------------------------------------------------------------------

pub trait SessionRepository: Send + Sync {
    fn create(&self, input: CreateSession) -> impl Future<Output = VelaResult<Session>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = VelaResult<Session>> + Send;
    /// Look up a session by refresh-token hash, in **any** state.
    /// Terminal-state sessions must be returned too: a hit on a
    /// `Superseded` session is the token-theft signal.
    fn get_by_token_hash(
        &self,
        tenant_id: Uuid,
        token_hash: &str,
    ) -> impl Future<Output = VelaResult<Session>> + Send;
    /// Active session for the same device, if one exists (one session
    /// per device).
    fn find_active_by_fingerprint(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        fingerprint: &str,
    ) -> impl Future<Output = VelaResult<Option<Session>>> + Send;
    /// Active sessions of an account, for the device-management
    /// endpoints.
    fn list_active(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> impl Future<Output = VelaResult<Vec<Session>>> + Send;
    /// Atomically transition `Active -> Superseded`. Fails with
    /// `Conflict` if the session is no longer active, which makes a
    /// concurrent double-rotation lose deterministically.
    fn mark_superseded(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = VelaResult<()>> + Send;
    fn revoke(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reason: RevokeReason,
    ) -> impl Future<Output = VelaResult<()>> + Send;
    /// Revoke every active session of an account, optionally sparing
    /// one (the caller's current session). Returns the sessions that
    /// were revoked so their refresh hashes can be blacklisted.
    fn revoke_all(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        reason: RevokeReason,
        except: Option<Uuid>,
    ) -> impl Future<Output = VelaResult<Vec<Session>>> + Send;
    /// Record refresh-token use.
    fn touch(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = VelaResult<()>> + Send;
    /// Remove sessions past their expiry. Returns how many were removed.
    fn cleanup_expired(&self, tenant_id: Uuid) -> impl Future<Output = VelaResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Token blacklist
// ---------------------------------------------------------------------------

pub trait BlacklistRepository: Send + Sync {
    fn insert(&self, entry: BlacklistEntry) -> impl Future<Output = VelaResult<()>> + Send;
    /// True if the hash is blacklisted and the entry has not expired.
    fn contains(&self, token_hash: &str) -> impl Future<Output = VelaResult<bool>> + Send;
    /// Drop entries whose `expires_at` has passed. Returns how many
    /// were purged.
    fn purge_expired(&self) -> impl Future<Output = VelaResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Failed-login counters
// ---------------------------------------------------------------------------

pub trait FailedLoginRepository: Send + Sync {
    fn get(
        &self,
        key: &AttemptKey,
    ) -> impl Future<Output = VelaResult<Option<FailedLoginCounter>>> + Send;
    fn put(&self, counter: FailedLoginCounter) -> impl Future<Output = VelaResult<()>> + Send;
    fn clear(&self, key: &AttemptKey) -> impl Future<Output = VelaResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Audit log (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a fully formed entry (seq and hashes already assigned by
    /// the chain). No update or delete operations exist.
    fn append(&self, entry: AuditEntry) -> impl Future<Output = VelaResult<()>> + Send;
    /// The entry with the highest `seq`, if any.
    fn head(&self) -> impl Future<Output = VelaResult<Option<AuditEntry>>> + Send;
    /// Entries with `from_seq <= seq <= to_seq`, ascending.
    fn range(
        &self,
        from_seq: u64,
        to_seq: u64,
    ) -> impl Future<Output = VelaResult<Vec<AuditEntry>>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = VelaResult<PaginatedResult<AuditEntry>>> + Send;
}

// ---------------------------------------------------------------------------
// Shipments (tenant-scoped, versioned)
// ---------------------------------------------------------------------------

pub trait ShipmentRepository: Send + Sync {
    fn create(&self, input: CreateShipment) -> impl Future<Output = VelaResult<Shipment>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = VelaResult<Shipment>> + Send;
    /// Atomic conditional update: `(id, expected_version) ->
    /// (id, expected_version + 1)`. A stale `expected_version` returns
    /// `Conflict`; a row missing for this tenant returns `NotFound`.
    fn update_versioned(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected_version: u32,
        patch: UpdateShipment,
    ) -> impl Future<Output = VelaResult<Shipment>> + Send;
}

// ---------------------------------------------------------------------------
// Bank consents (tenant-scoped connector state)
// ---------------------------------------------------------------------------

pub trait ConsentRepository: Send + Sync {
    /// Create or replace the consent row for `(tenant_id, account_ref)`.
    fn upsert(&self, input: ConsentUpdate) -> impl Future<Output = VelaResult<BankConsent>> + Send;
    fn get(
        &self,
        tenant_id: Uuid,
        account_ref: &str,
    ) -> impl Future<Output = VelaResult<BankConsent>> + Send;
}
