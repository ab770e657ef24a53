//! Authenticated caller identity and the stored account backing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of an account within its tenant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Admin,
    Operations,
    Finance,
    Viewer,
}

/// The authenticated caller of a request.
///
/// Produced only by access-token validation; immutable for the
/// lifetime of the token. `tenant_id` is non-optional so that every
/// tenant-scoped query signature forces scoping at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Suspended,
}

/// Stored identity backing a [`Principal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    /// Embedded in every access token at issue time; bumping it
    /// invalidates all previously issued access tokens at once.
    pub token_version: u32,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub tenant_id: Uuid,
    pub email: String,
    pub role: Role,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
}
