//! Sensitive-route handlers — the business half of the pipeline.
//!
//! Each handler receives an admitted [`Principal`], applies the
//! ownership guard, performs its mutation, and writes exactly one
//! audit entry on exit. Audit failures propagate: an operation that
//! cannot be recorded does not happen.

use tracing::warn;
use uuid::Uuid;

use vela_audit::AuditChain;
use vela_core::error::VelaResult;
use vela_core::guard;
use vela_core::models::audit::CreateAuditEntry;
use vela_core::models::consent::{BankConsent, ConsentUpdate};
use vela_core::models::principal::Principal;
use vela_core::models::shipment::{Shipment, UpdateShipment};
use vela_core::repository::{AuditLogRepository, ConsentRepository, ShipmentRepository};
use vela_resilience::client::{CallError, ResilientClient, UpstreamError};
use vela_resilience::rate_limit::{CounterStore, RateLimiter, RouteClass};

/// Versioned shipment update: ownership guard, then the atomic
/// conditional write. A stale version surfaces as `Conflict` telling
/// the client to refetch; both outcomes are audited.
pub async fn update_shipment<R, L>(
    principal: &Principal,
    shipments: &R,
    audit: &AuditChain<L>,
    shipment_id: Uuid,
    expected_version: u32,
    patch: UpdateShipment,
) -> VelaResult<Shipment>
where
    R: ShipmentRepository,
    L: AuditLogRepository,
{
    let current = shipments.get_by_id(principal.tenant_id, shipment_id).await?;
    let current = guard::verify_ownership(principal, current, "shipment")?;

    let result = shipments
        .update_versioned(principal.tenant_id, current.id, expected_version, patch)
        .await;

    audit
        .append(CreateAuditEntry {
            actor_id: principal.id,
            tenant_id: principal.tenant_id,
            action: "shipment_update".into(),
            resource_type: "shipment".into(),
            resource_id: Some(shipment_id),
            success: result.is_ok(),
        })
        .await?;

    result
}

/// Inbound consent-update webhook from the bank aggregator.
///
/// Unauthenticated by design, therefore rate-limited by source IP and
/// always audited (actor is the nil UUID — the caller is external).
pub async fn consent_webhook<C, R, L>(
    limiter: &RateLimiter<C>,
    consents: &R,
    audit: &AuditChain<L>,
    source_ip: &str,
    payload: ConsentUpdate,
) -> VelaResult<BankConsent>
where
    C: CounterStore,
    R: ConsentRepository,
    L: AuditLogRepository,
{
    limiter
        .require(
            &RouteClass::Webhook.key(source_ip),
            RouteClass::Webhook.rule(),
        )
        .await?;

    let tenant_id = payload.tenant_id;
    let consent = consents.upsert(payload).await?;

    audit
        .append(CreateAuditEntry {
            actor_id: Uuid::nil(),
            tenant_id,
            action: "consent_update".into(),
            resource_type: "bank_consent".into(),
            resource_id: None,
            success: true,
        })
        .await?;

    Ok(consent)
}

/// The AI text provider, an opaque external dependency. The real
/// implementation is an HTTP client; tests substitute failures.
pub trait DraftProvider: Send + Sync {
    fn draft(&self, prompt: &str) -> impl Future<Output = Result<String, UpstreamError>> + Send;
}

/// AI-assisted drafting routed through the resilient client.
///
/// When retries are exhausted or the circuit is open the handler
/// degrades to the caller-supplied fallback text instead of
/// propagating a raw network failure; the degraded outcome is what
/// gets audited.
pub async fn draft_text<P, L>(
    principal: &Principal,
    client: &ResilientClient,
    provider: &P,
    audit: &AuditChain<L>,
    prompt: &str,
    fallback: &str,
) -> VelaResult<String>
where
    P: DraftProvider,
    L: AuditLogRepository,
{
    let result = client
        .call("ai_provider", || provider.draft(prompt))
        .await;

    let (text, success) = match result {
        Ok(text) => (text, true),
        Err(err @ CallError::CircuitOpen { .. }) | Err(err @ CallError::Upstream { .. }) => {
            warn!(error = %err, "AI provider unavailable, serving fallback draft");
            (fallback.to_string(), false)
        }
    };

    audit
        .append(CreateAuditEntry {
            actor_id: principal.id,
            tenant_id: principal.tenant_id,
            action: "ai_draft".into(),
            resource_type: "document".into(),
            resource_id: None,
            success,
        })
        .await?;

    Ok(text)
}
