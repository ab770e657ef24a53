//! Error types for the VELA trust core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VelaError {
    /// Also returned when a resource exists but belongs to another
    /// tenant — existence must not leak across tenant boundaries.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Circuit open for dependency {dependency}, retry in {retry_after_secs}s")]
    CircuitOpen {
        dependency: String,
        retry_after_secs: u64,
    },

    /// A conditional write lost the race: another writer advanced the
    /// entity's version. Callers should refetch and retry.
    #[error("Stale version for {entity} with id {id}: refetch and retry")]
    Conflict { entity: String, id: String },

    /// The audit hash chain failed verification. This is a
    /// system-integrity incident and is never silently recovered.
    #[error("Audit chain broken at seq {seq}")]
    AuditChainBroken { seq: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type VelaResult<T> = Result<T, VelaError>;
