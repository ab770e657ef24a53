//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! Inserts only. The table's permission grants (see `schema.rs`)
//! forbid UPDATE and DELETE, so the append-only property holds even
//! against application bugs.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use vela_core::error::VelaResult;
use vela_core::models::audit::AuditEntry;
use vela_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditRow {
    record_id: String,
    seq: u64,
    tenant_id: String,
    actor_id: String,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    success: bool,
    prev_hash: String,
    entry_hash: String,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditEntry, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Migration(format!("invalid UUID: {e}")))?;
        let tenant_id = Uuid::parse_str(&self.tenant_id)
            .map_err(|e| DbError::Migration(format!("invalid tenant UUID: {e}")))?;
        let actor_id = Uuid::parse_str(&self.actor_id)
            .map_err(|e| DbError::Migration(format!("invalid actor UUID: {e}")))?;
        let resource_id = self
            .resource_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| DbError::Migration(format!("invalid resource UUID: {e}")))?;
        Ok(AuditEntry {
            id,
            seq: self.seq,
            timestamp: self.timestamp,
            actor_id,
            tenant_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id,
            success: self.success,
            prev_hash: self.prev_hash,
            entry_hash: self.entry_hash,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

const SELECT_FIELDS: &str = "meta::id(id) AS record_id, *";

/// SurrealDB implementation of the audit log store.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, entry: AuditEntry) -> VelaResult<()> {
        // The unique index on seq rejects a duplicate position, so a
        // second chain writer cannot silently fork the log.
        self.db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 seq = $seq, \
                 tenant_id = $tenant_id, \
                 actor_id = $actor_id, \
                 action = $action, \
                 resource_type = $resource_type, \
                 resource_id = $resource_id, \
                 success = $success, \
                 prev_hash = $prev_hash, \
                 entry_hash = $entry_hash, \
                 timestamp = $timestamp",
            )
            .bind(("id", entry.id.to_string()))
            .bind(("seq", entry.seq))
            .bind(("tenant_id", entry.tenant_id.to_string()))
            .bind(("actor_id", entry.actor_id.to_string()))
            .bind(("action", entry.action))
            .bind(("resource_type", entry.resource_type))
            .bind(("resource_id", entry.resource_id.map(|id| id.to_string())))
            .bind(("success", entry.success))
            .bind(("prev_hash", entry.prev_hash))
            .bind(("entry_hash", entry.entry_hash))
            .bind(("timestamp", entry.timestamp))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(())
    }

    async fn head(&self) -> VelaResult<Option<AuditEntry>> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM audit_log \
                 ORDER BY seq DESC LIMIT 1"
            ))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_entry()?)),
            None => Ok(None),
        }
    }

    async fn range(&self, from_seq: u64, to_seq: u64) -> VelaResult<Vec<AuditEntry>> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {SELECT_FIELDS} FROM audit_log \
                 WHERE seq >= $from AND seq <= $to \
                 ORDER BY seq ASC"
            ))
            .bind(("from", from_seq))
            .bind(("to", to_seq))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_entry().map_err(Into::into))
            .collect()
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> VelaResult<PaginatedResult<AuditEntry>> {
        let mut conditions = vec!["tenant_id = $tenant_id"];
        if filter.actor_id.is_some() {
            conditions.push("actor_id = $actor_id");
        }
        if filter.action.is_some() {
            conditions.push("action = $action");
        }
        if filter.resource_id.is_some() {
            conditions.push("resource_id = $resource_id");
        }
        if filter.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if filter.to.is_some() {
            conditions.push("timestamp <= $to");
        }
        let where_clause = conditions.join(" AND ");

        let list_sql = format!(
            "SELECT {SELECT_FIELDS} FROM audit_log WHERE {where_clause} \
             ORDER BY seq DESC LIMIT $limit START $offset"
        );
        let count_sql =
            format!("SELECT count() AS total FROM audit_log WHERE {where_clause} GROUP ALL");

        let mut builder = self
            .db
            .query(list_sql)
            .query(count_sql)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));

        if let Some(actor_id) = filter.actor_id {
            builder = builder.bind(("actor_id", actor_id.to_string()));
        }
        if let Some(action) = filter.action {
            builder = builder.bind(("action", action));
        }
        if let Some(resource_id) = filter.resource_id {
            builder = builder.bind(("resource_id", resource_id.to_string()));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(1).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let items = rows
            .into_iter()
            .map(|row| row.try_into_entry().map_err(Into::into))
            .collect::<VelaResult<Vec<_>>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
