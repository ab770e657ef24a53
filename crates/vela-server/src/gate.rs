//! Request gate — the inbound half of the pipeline.
//!
//! Rate limiting runs before authentication for IP-scoped routes
//! (login, registration, webhooks: an attacker without credentials
//! must still be throttled) and after it for account/tenant-scoped
//! routes, which need the validated principal for their counter key.

use std::sync::Arc;

use uuid::Uuid;

use vela_auth::AuthService;
use vela_core::error::VelaResult;
use vela_core::models::principal::Principal;
use vela_core::repository::{
    AccountRepository, AuditLogRepository, BlacklistRepository, FailedLoginRepository,
    SessionRepository,
};
use vela_resilience::rate_limit::{CounterStore, Decision, RateLimiter, RateScope, RouteClass};

/// A request that passed the gate.
#[derive(Debug)]
pub struct Admission {
    pub principal: Principal,
    /// Session the bearer token was issued under.
    pub session_id: Uuid,
}

/// Rate limiter + authenticator in front of every sensitive route.
pub struct RequestGate<A, S, B, F, L, C>
where
    A: AccountRepository,
    S: SessionRepository,
    B: BlacklistRepository,
    F: FailedLoginRepository,
    L: AuditLogRepository,
    C: CounterStore,
{
    limiter: RateLimiter<C>,
    auth: Arc<AuthService<A, S, B, F, L>>,
}

impl<A, S, B, F, L, C> RequestGate<A, S, B, F, L, C>
where
    A: AccountRepository,
    S: SessionRepository,
    B: BlacklistRepository,
    F: FailedLoginRepository,
    L: AuditLogRepository,
    C: CounterStore,
{
    pub fn new(limiter: RateLimiter<C>, auth: Arc<AuthService<A, S, B, F, L>>) -> Self {
        Self { limiter, auth }
    }

    /// Admit an unauthenticated request (login, registration, inbound
    /// webhooks). Throttled by source IP only.
    pub async fn admit_public(&self, route: RouteClass, client_ip: &str) -> VelaResult<Decision> {
        self.limiter
            .require(&route.key(client_ip), route.rule())
            .await
    }

    /// Admit an authenticated request: rate limit and bearer-token
    /// validation, in the order the route's scope dictates.
    pub async fn admit(
        &self,
        route: RouteClass,
        bearer_token: &str,
        client_ip: &str,
    ) -> VelaResult<Admission> {
        match route.scope() {
            RateScope::Ip => {
                self.limiter
                    .require(&route.key(client_ip), route.rule())
                    .await?;
                let (principal, session_id) = self.auth.validate_session(bearer_token).await?;
                Ok(Admission {
                    principal,
                    session_id,
                })
            }
            RateScope::Account | RateScope::Tenant => {
                let (principal, session_id) = self.auth.validate_session(bearer_token).await?;
                let scope_key = match route.scope() {
                    RateScope::Account => principal.id.to_string(),
                    _ => principal.tenant_id.to_string(),
                };
                self.limiter
                    .require(&route.key(&scope_key), route.rule())
                    .await?;
                Ok(Admission {
                    principal,
                    session_id,
                })
            }
        }
    }

    pub fn auth(&self) -> &AuthService<A, S, B, F, L> {
        &self.auth
    }
}
