//! Shipment domain model — the versioned-entity exemplar.
//!
//! Shipments carry an integer `version`; every mutating write supplies
//! the version it last read and storage performs an atomic conditional
//! update. No locks are held across the read-modify-write gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::guard::TenantOwned;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShipmentStatus {
    Draft,
    InTransit,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Exporter's shipment reference, unique per tenant.
    pub reference: String,
    pub consignee: String,
    pub destination: String,
    /// ISO 4217 currency code of the invoice value.
    pub currency: String,
    pub value_cents: i64,
    pub status: ShipmentStatus,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantOwned for Shipment {
    fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShipment {
    pub tenant_id: Uuid,
    pub reference: String,
    pub consignee: String,
    pub destination: String,
    pub currency: String,
    pub value_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateShipment {
    pub consignee: Option<String>,
    pub destination: Option<String>,
    pub value_cents: Option<i64>,
    pub status: Option<ShipmentStatus>,
}
