//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. The audit table additionally
//! carries table-level permission grants that forbid UPDATE and
//! DELETE entirely — append-only is enforced by storage, not just
//! application convention.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Accounts (tenant scope)
-- =======================================================================
DEFINE TABLE account SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE account TYPE string;
DEFINE FIELD email ON TABLE account TYPE string;
DEFINE FIELD role ON TABLE account TYPE string \
    ASSERT $value IN ['Admin', 'Operations', 'Finance', 'Viewer'];
DEFINE FIELD password_hash ON TABLE account TYPE string;
DEFINE FIELD token_version ON TABLE account TYPE int DEFAULT 0;
DEFINE FIELD status ON TABLE account TYPE string \
    ASSERT $value IN ['Active', 'Suspended'];
DEFINE FIELD created_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_account_tenant_email ON TABLE account \
    COLUMNS tenant_id, email UNIQUE;

-- =======================================================================
-- Sessions (tenant scope, one per device)
-- =======================================================================
DEFINE TABLE session SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE session TYPE string;
DEFINE FIELD account_id ON TABLE session TYPE string;
DEFINE FIELD token_hash ON TABLE session TYPE string;
DEFINE FIELD device_fingerprint ON TABLE session TYPE string;
DEFINE FIELD ip_address ON TABLE session TYPE string;
DEFINE FIELD user_agent ON TABLE session TYPE string;
DEFINE FIELD state ON TABLE session TYPE string \
    ASSERT $value IN ['Active', 'Superseded', 'Revoked'];
DEFINE FIELD revoke_reason ON TABLE session TYPE option<string>;
DEFINE FIELD expires_at ON TABLE session TYPE datetime;
DEFINE FIELD last_used_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD created_at ON TABLE session TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_session_token ON TABLE session \
    COLUMNS tenant_id, token_hash UNIQUE;
DEFINE INDEX idx_session_account ON TABLE session \
    COLUMNS tenant_id, account_id;

-- =======================================================================
-- Token blacklist (global scope — hashes are unique)
-- =======================================================================
DEFINE TABLE blacklist SCHEMAFULL;
DEFINE FIELD token_hash ON TABLE blacklist TYPE string;
DEFINE FIELD reason ON TABLE blacklist TYPE string \
    ASSERT $value IN ['Logout', 'LogoutAll', 'PasswordChange', \
    'Rotated', 'TheftSuspected'];
DEFINE FIELD expires_at ON TABLE blacklist TYPE datetime;
DEFINE INDEX idx_blacklist_hash ON TABLE blacklist \
    COLUMNS token_hash UNIQUE;

-- =======================================================================
-- Failed-login counters (keyed by identity or IP)
-- =======================================================================
DEFINE TABLE failed_login SCHEMAFULL;
DEFINE FIELD key ON TABLE failed_login TYPE string;
DEFINE FIELD count ON TABLE failed_login TYPE int DEFAULT 0;
DEFINE FIELD window_start ON TABLE failed_login TYPE datetime;
DEFINE FIELD locked_until ON TABLE failed_login \
    TYPE option<datetime>;
DEFINE INDEX idx_failed_login_key ON TABLE failed_login \
    COLUMNS key UNIQUE;

-- =======================================================================
-- Audit Log (hash-chained, append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD seq ON TABLE audit_log TYPE int;
DEFINE FIELD tenant_id ON TABLE audit_log TYPE string;
DEFINE FIELD actor_id ON TABLE audit_log TYPE string;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD resource_type ON TABLE audit_log TYPE string;
DEFINE FIELD resource_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD success ON TABLE audit_log TYPE bool;
DEFINE FIELD prev_hash ON TABLE audit_log TYPE string;
DEFINE FIELD entry_hash ON TABLE audit_log TYPE string;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime;
DEFINE INDEX idx_audit_seq ON TABLE audit_log COLUMNS seq UNIQUE;
DEFINE INDEX idx_audit_tenant_time ON TABLE audit_log \
    COLUMNS tenant_id, timestamp;

-- =======================================================================
-- Shipments (tenant scope, versioned)
-- =======================================================================
DEFINE TABLE shipment SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE shipment TYPE string;
DEFINE FIELD reference ON TABLE shipment TYPE string;
DEFINE FIELD consignee ON TABLE shipment TYPE string;
DEFINE FIELD destination ON TABLE shipment TYPE string;
DEFINE FIELD currency ON TABLE shipment TYPE string;
DEFINE FIELD value_cents ON TABLE shipment TYPE int;
DEFINE FIELD status ON TABLE shipment TYPE string \
    ASSERT $value IN ['Draft', 'InTransit', 'Delivered', 'Cancelled'];
DEFINE FIELD version ON TABLE shipment TYPE int DEFAULT 1;
DEFINE FIELD created_at ON TABLE shipment TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE shipment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_shipment_tenant_ref ON TABLE shipment \
    COLUMNS tenant_id, reference UNIQUE;

-- =======================================================================
-- Bank consents (tenant scope connector state)
-- =======================================================================
DEFINE TABLE bank_consent SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE bank_consent TYPE string;
DEFINE FIELD account_ref ON TABLE bank_consent TYPE string;
DEFINE FIELD provider ON TABLE bank_consent TYPE string;
DEFINE FIELD status ON TABLE bank_consent TYPE string \
    ASSERT $value IN ['Granted', 'Revoked', 'Expired'];
DEFINE FIELD updated_at ON TABLE bank_consent TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_consent_tenant_ref ON TABLE bank_consent \
    COLUMNS tenant_id, account_ref UNIQUE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn audit_table_forbids_update_and_delete() {
        // The append-only guarantee lives in the DDL, not app code.
        assert!(SCHEMA_V1.contains("FOR update NONE"));
        assert!(SCHEMA_V1.contains("FOR delete NONE"));
    }
}
