//! Bank-aggregator consent state, updated by the inbound webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsentStatus {
    Granted,
    Revoked,
    Expired,
}

/// Connector-side consent for pulling a tenant's bank data.
///
/// Keyed naturally by `(tenant_id, account_ref)` — webhook
/// redeliveries overwrite in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConsent {
    pub tenant_id: Uuid,
    /// Aggregator-side account reference.
    pub account_ref: String,
    pub provider: String,
    pub status: ConsentStatus,
    pub updated_at: DateTime<Utc>,
}

/// Payload of the aggregator's consent-update webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentUpdate {
    pub tenant_id: Uuid,
    pub account_ref: String,
    pub provider: String,
    pub status: ConsentStatus,
}
