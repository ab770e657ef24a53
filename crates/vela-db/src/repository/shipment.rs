//! SurrealDB implementation of [`ShipmentRepository`].
//!
//! The versioned update is a single conditional statement: the WHERE
//! clause carries the expected version, so exactly one of any set of
//! concurrent writers advances the row and the rest see zero rows.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use vela_core::error::VelaResult;
use vela_core::models::shipment::{CreateShipment, Shipment, ShipmentStatus, UpdateShipment};
use vela_core::repository::ShipmentRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct ShipmentRow {
    tenant_id: String,
    reference: String,
    consignee: String,
    destination: String,
    currency: String,
    value_cents: i64,
    status: String,
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<ShipmentStatus, DbError> {
    match s {
        "Draft" => Ok(ShipmentStatus::Draft),
        "InTransit" => Ok(ShipmentStatus::InTransit),
        "Delivered" => Ok(ShipmentStatus::Delivered),
        "Cancelled" => Ok(ShipmentStatus::Cancelled),
        other => Err(DbError::Migration(format!("unknown shipment status: {other}"))),
    }
}

fn status_to_string(status: ShipmentStatus) -> &'static str {
    match status {
        ShipmentStatus::Draft => "Draft",
        ShipmentStatus::InTransit => "InTransit",
        ShipmentStatus::Delivered => "Delivered",
        ShipmentStatus::Cancelled => "Cancelled",
    }
}

impl ShipmentRow {
    fn into_shipment(self, id: Uuid) -> Result<Shipment, DbError> {
        let tenant_id = Uuid::parse_str(&self.tenant_id)
            .map_err(|e| DbError::Migration(format!("invalid tenant UUID: {e}")))?;
        Ok(Shipment {
            id,
            tenant_id,
            reference: self.reference,
            consignee: self.consignee,
            destination: self.destination,
            currency: self.currency,
            value_cents: self.value_cents,
            status: parse_status(&self.status)?,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Shipment repository.
#[derive(Clone)]
pub struct SurrealShipmentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealShipmentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ShipmentRepository for SurrealShipmentRepository<C> {
    async fn create(&self, input: CreateShipment) -> VelaResult<Shipment> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('shipment', $id) SET \
                 tenant_id = $tenant_id, \
                 reference = $reference, \
                 consignee = $consignee, \
                 destination = $destination, \
                 currency = $currency, \
                 value_cents = $value_cents, \
                 status = 'Draft', \
                 version = 1",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("reference", input.reference))
            .bind(("consignee", input.consignee))
            .bind(("destination", input.destination))
            .bind(("currency", input.currency))
            .bind(("value_cents", input.value_cents))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<ShipmentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "shipment".into(),
            id: id_str,
        })?;

        Ok(row.into_shipment(id)?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> VelaResult<Shipment> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('shipment', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ShipmentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "shipment".into(),
            id: id_str,
        })?;

        Ok(row.into_shipment(id)?)
    }

    async fn update_versioned(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        expected_version: u32,
        patch: UpdateShipment,
    ) -> VelaResult<Shipment> {
        let id_str = id.to_string();

        let mut sets = vec!["version = version + 1", "updated_at = time::now()"];
        if patch.consignee.is_some() {
            sets.push("consignee = $consignee");
        }
        if patch.destination.is_some() {
            sets.push("destination = $destination");
        }
        if patch.value_cents.is_some() {
            sets.push("value_cents = $value_cents");
        }
        if patch.status.is_some() {
            sets.push("status = $status");
        }

        let sql = format!(
            "UPDATE type::record('shipment', $id) SET {} \
             WHERE tenant_id = $tenant_id AND version = $expected_version",
            sets.join(", "),
        );

        let mut builder = self
            .db
            .query(sql)
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("expected_version", expected_version));

        if let Some(consignee) = patch.consignee {
            builder = builder.bind(("consignee", consignee));
        }
        if let Some(destination) = patch.destination {
            builder = builder.bind(("destination", destination));
        }
        if let Some(value_cents) = patch.value_cents {
            builder = builder.bind(("value_cents", value_cents));
        }
        if let Some(status) = patch.status {
            builder = builder.bind(("status", status_to_string(status).to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<ShipmentRow> = result.take(0).map_err(DbError::from)?;

        match rows.into_iter().next() {
            Some(row) => Ok(row.into_shipment(id)?),
            None => {
                // Zero rows: either the row is missing for this tenant
                // (NotFound) or another writer won the race (Conflict).
                // One follow-up read distinguishes them.
                self.get_by_id(tenant_id, id).await?;
                Err(DbError::StaleVersion {
                    entity: "shipment".into(),
                    id: id_str,
                }
                .into())
            }
        }
    }
}
