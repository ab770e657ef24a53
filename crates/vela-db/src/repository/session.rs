//! SurrealDB implementation of [`SessionRepository`].
//!
//! State transitions are conditional writes: `mark_superseded` and
//! `revoke_all` only touch rows still in the `Active` state, so
//! concurrent transitions resolve at the storage layer instead of
//! racing in application code.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use vela_core::error::VelaResult;
use vela_core::models::session::{CreateSession, RevokeReason, Session, SessionState};
use vela_core::repository::SessionRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct SessionRow {
    tenant_id: String,
    account_id: String,
    token_hash: String,
    device_fingerprint: String,
    ip_address: String,
    user_agent: String,
    state: String,
    revoke_reason: Option<String>,
    expires_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct SessionRowWithId {
    record_id: String,
    tenant_id: String,
    account_id: String,
    token_hash: String,
    device_fingerprint: String,
    ip_address: String,
    user_agent: String,
    state: String,
    revoke_reason: Option<String>,
    expires_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

fn parse_state(s: &str) -> Result<SessionState, DbError> {
    match s {
        "Active" => Ok(SessionState::Active),
        "Superseded" => Ok(SessionState::Superseded),
        "Revoked" => Ok(SessionState::Revoked),
        other => Err(DbError::Migration(format!("unknown session state: {other}"))),
    }
}

fn parse_reason(s: &str) -> Result<RevokeReason, DbError> {
    match s {
        "Logout" => Ok(RevokeReason::Logout),
        "LogoutAll" => Ok(RevokeReason::LogoutAll),
        "PasswordChange" => Ok(RevokeReason::PasswordChange),
        "Expired" => Ok(RevokeReason::Expired),
        "Replaced" => Ok(RevokeReason::Replaced),
        "TheftSuspected" => Ok(RevokeReason::TheftSuspected),
        other => Err(DbError::Migration(format!("unknown revoke reason: {other}"))),
    }
}

fn reason_to_string(reason: RevokeReason) -> &'static str {
    match reason {
        RevokeReason::Logout => "Logout",
        RevokeReason::LogoutAll => "LogoutAll",
        RevokeReason::PasswordChange => "PasswordChange",
        RevokeReason::Expired => "Expired",
        RevokeReason::Replaced => "Replaced",
        RevokeReason::TheftSuspected => "TheftSuspected",
    }
}

fn row_to_session(row: SessionRow, id: Uuid) -> Result<Session, DbError> {
    let tenant_id = Uuid::parse_str(&row.tenant_id)
        .map_err(|e| DbError::Migration(format!("invalid tenant UUID: {e}")))?;
    let account_id = Uuid::parse_str(&row.account_id)
        .map_err(|e| DbError::Migration(format!("invalid account UUID: {e}")))?;
    let revoke_reason = row.revoke_reason.as_deref().map(parse_reason).transpose()?;
    Ok(Session {
        id,
        tenant_id,
        account_id,
        token_hash: row.token_hash,
        device_fingerprint: row.device_fingerprint,
        ip_address: row.ip_address,
        user_agent: row.user_agent,
        state: parse_state(&row.state)?,
        revoke_reason,
        created_at: row.created_at,
        last_used_at: row.last_used_at,
        expires_at: row.expires_at,
    })
}

impl SessionRowWithId {
    fn try_into_session(self) -> Result<Session, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Migration(format!("invalid UUID: {e}")))?;
        row_to_session(
            SessionRow {
                tenant_id: self.tenant_id,
                account_id: self.account_id,
                token_hash: self.token_hash,
                device_fingerprint: self.device_fingerprint,
                ip_address: self.ip_address,
                user_agent: self.user_agent,
                state: self.state,
                revoke_reason: self.revoke_reason,
                expires_at: self.expires_at,
                last_used_at: self.last_used_at,
                created_at: self.created_at,
            },
            id,
        )
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the Session repository.
#[derive(Clone)]
pub struct SurrealSessionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> SessionRepository for SurrealSessionRepository<C> {
    async fn create(&self, input: CreateSession) -> VelaResult<Session> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('session', $id) SET \
                 tenant_id = $tenant_id, \
                 account_id = $account_id, \
                 token_hash = $token_hash, \
                 device_fingerprint = $device_fingerprint, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 state = 'Active', \
                 revoke_reason = NONE, \
                 expires_at = $expires_at",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("account_id", input.account_id.to_string()))
            .bind(("token_hash", input.token_hash))
            .bind(("device_fingerprint", input.device_fingerprint))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("expires_at", input.expires_at))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        Ok(row_to_session(row, id)?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> VelaResult<Session> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('session', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: id_str,
        })?;

        Ok(row_to_session(row, id)?)
    }

    async fn get_by_token_hash(&self, tenant_id: Uuid, token_hash: &str) -> VelaResult<Session> {
        let token_hash_owned = token_hash.to_string();

        // No state filter: terminal-state hits carry the theft signal.
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE tenant_id = $tenant_id AND token_hash = $token_hash",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("token_hash", token_hash_owned.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "session".into(),
            id: format!("token_hash={token_hash_owned}"),
        })?;

        Ok(row.try_into_session()?)
    }

    async fn find_active_by_fingerprint(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        fingerprint: &str,
    ) -> VelaResult<Option<Session>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE tenant_id = $tenant_id \
                 AND account_id = $account_id \
                 AND device_fingerprint = $fingerprint \
                 AND state = 'Active'",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("account_id", account_id.to_string()))
            .bind(("fingerprint", fingerprint.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_session()?)),
            None => Ok(None),
        }
    }

    async fn list_active(&self, tenant_id: Uuid, account_id: Uuid) -> VelaResult<Vec<Session>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE tenant_id = $tenant_id \
                 AND account_id = $account_id \
                 AND state = 'Active' \
                 ORDER BY created_at DESC",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("account_id", account_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_session().map_err(Into::into))
            .collect()
    }

    async fn mark_superseded(&self, tenant_id: Uuid, id: Uuid) -> VelaResult<()> {
        let id_str = id.to_string();

        // Conditional on state so one of two concurrent rotations
        // loses with zero rows affected.
        let mut result = self
            .db
            .query(
                "UPDATE type::record('session', $id) SET \
                 state = 'Superseded' \
                 WHERE tenant_id = $tenant_id AND state = 'Active'",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::StaleVersion {
                entity: "session".into(),
                id: id_str,
            }
            .into());
        }
        Ok(())
    }

    async fn revoke(&self, tenant_id: Uuid, id: Uuid, reason: RevokeReason) -> VelaResult<()> {
        self.db
            .query(
                "UPDATE type::record('session', $id) SET \
                 state = 'Revoked', \
                 revoke_reason = $reason \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("reason", reason_to_string(reason).to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn revoke_all(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        reason: RevokeReason,
        except: Option<Uuid>,
    ) -> VelaResult<Vec<Session>> {
        let except_id = except.map(|id| id.to_string()).unwrap_or_default();

        // Read the targets first, then flip them. The conditional
        // UPDATE still only touches rows that were active.
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM session \
                 WHERE tenant_id = $tenant_id \
                 AND account_id = $account_id \
                 AND state = 'Active' \
                 AND meta::id(id) != $except",
            )
            .query(
                "UPDATE session SET \
                 state = 'Revoked', \
                 revoke_reason = $reason \
                 WHERE tenant_id = $tenant_id \
                 AND account_id = $account_id \
                 AND state = 'Active' \
                 AND meta::id(id) != $except",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("account_id", account_id.to_string()))
            .bind(("reason", reason_to_string(reason).to_string()))
            .bind(("except", except_id))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<SessionRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_session().map_err(Into::into))
            .collect()
    }

    async fn touch(&self, tenant_id: Uuid, id: Uuid, at: DateTime<Utc>) -> VelaResult<()> {
        self.db
            .query(
                "UPDATE type::record('session', $id) SET \
                 last_used_at = $at \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("at", at))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn cleanup_expired(&self, tenant_id: Uuid) -> VelaResult<u64> {
        // Count expired sessions first, then delete.
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM session \
                 WHERE tenant_id = $tenant_id AND expires_at < time::now() \
                 GROUP ALL",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query("DELETE session WHERE tenant_id = $tenant_id AND expires_at < time::now()")
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}
