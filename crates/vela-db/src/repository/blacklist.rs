//! SurrealDB implementation of [`BlacklistRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use vela_core::error::VelaResult;
use vela_core::models::blacklist::{BlacklistEntry, BlacklistReason};
use vela_core::repository::BlacklistRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct BlacklistRow {
    token_hash: String,
    #[allow(dead_code)]
    reason: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn reason_to_string(reason: BlacklistReason) -> &'static str {
    match reason {
        BlacklistReason::Logout => "Logout",
        BlacklistReason::LogoutAll => "LogoutAll",
        BlacklistReason::PasswordChange => "PasswordChange",
        BlacklistReason::Rotated => "Rotated",
        BlacklistReason::TheftSuspected => "TheftSuspected",
    }
}

/// SurrealDB implementation of the token blacklist.
#[derive(Clone)]
pub struct SurrealBlacklistRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealBlacklistRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> BlacklistRepository for SurrealBlacklistRepository<C> {
    async fn insert(&self, entry: BlacklistEntry) -> VelaResult<()> {
        // UPSERT keyed by hash: re-blacklisting the same token (e.g.
        // logout after rotation already caught it) is a no-op, not an
        // index violation.
        self.db
            .query(
                "UPSERT type::record('blacklist', $id) SET \
                 token_hash = $token_hash, \
                 reason = $reason, \
                 expires_at = $expires_at",
            )
            .bind(("id", entry.token_hash.clone()))
            .bind(("token_hash", entry.token_hash))
            .bind(("reason", reason_to_string(entry.reason).to_string()))
            .bind(("expires_at", entry.expires_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(())
    }

    async fn contains(&self, token_hash: &str) -> VelaResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM blacklist \
                 WHERE token_hash = $token_hash \
                 AND expires_at > time::now()",
            )
            .bind(("token_hash", token_hash.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BlacklistRow> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn purge_expired(&self) -> VelaResult<u64> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM blacklist \
                 WHERE expires_at <= time::now() \
                 GROUP ALL",
            )
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query("DELETE blacklist WHERE expires_at <= time::now()")
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}
