//! SurrealDB implementation of [`ConsentRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use vela_core::error::VelaResult;
use vela_core::models::consent::{BankConsent, ConsentStatus, ConsentUpdate};
use vela_core::repository::ConsentRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ConsentRow {
    tenant_id: String,
    account_ref: String,
    provider: String,
    status: String,
    updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<ConsentStatus, DbError> {
    match s {
        "Granted" => Ok(ConsentStatus::Granted),
        "Revoked" => Ok(ConsentStatus::Revoked),
        "Expired" => Ok(ConsentStatus::Expired),
        other => Err(DbError::Migration(format!("unknown consent status: {other}"))),
    }
}

fn status_to_string(status: ConsentStatus) -> &'static str {
    match status {
        ConsentStatus::Granted => "Granted",
        ConsentStatus::Revoked => "Revoked",
        ConsentStatus::Expired => "Expired",
    }
}

impl ConsentRow {
    fn try_into_consent(self) -> Result<BankConsent, DbError> {
        let tenant_id = Uuid::parse_str(&self.tenant_id)
            .map_err(|e| DbError::Migration(format!("invalid tenant UUID: {e}")))?;
        Ok(BankConsent {
            tenant_id,
            account_ref: self.account_ref,
            provider: self.provider,
            status: parse_status(&self.status)?,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the bank-consent store.
#[derive(Clone)]
pub struct SurrealConsentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealConsentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ConsentRepository for SurrealConsentRepository<C> {
    async fn upsert(&self, input: ConsentUpdate) -> VelaResult<BankConsent> {
        // Deterministic record id from (tenant, account_ref) makes the
        // webhook idempotent across redeliveries.
        let record_key = format!("{}:{}", input.tenant_id, input.account_ref);

        let mut result = self
            .db
            .query(
                "UPSERT type::record('bank_consent', $id) SET \
                 tenant_id = $tenant_id, \
                 account_ref = $account_ref, \
                 provider = $provider, \
                 status = $status, \
                 updated_at = time::now()",
            )
            .bind(("id", record_key.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("account_ref", input.account_ref))
            .bind(("provider", input.provider))
            .bind(("status", status_to_string(input.status).to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ConsentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "bank_consent".into(),
            id: record_key,
        })?;

        Ok(row.try_into_consent()?)
    }

    async fn get(&self, tenant_id: Uuid, account_ref: &str) -> VelaResult<BankConsent> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM bank_consent \
                 WHERE tenant_id = $tenant_id AND account_ref = $account_ref",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("account_ref", account_ref.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ConsentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "bank_consent".into(),
            id: format!("account_ref={account_ref}"),
        })?;

        Ok(row.try_into_consent()?)
    }
}
