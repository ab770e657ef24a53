//! VELA Server — application entry point.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use vela_audit::AuditChain;
use vela_auth::AuthService;
use vela_core::clock::{Clock, SystemClock};
use vela_db::repository::{
    SurrealAccountRepository, SurrealAuditLogRepository, SurrealBlacklistRepository,
    SurrealFailedLoginRepository, SurrealSessionRepository,
};
use vela_db::{DbManager, run_migrations};
use vela_resilience::breaker::{BreakerConfig, CircuitBreakerRegistry};
use vela_resilience::client::{ClientConfig, ResilientClient};
use vela_resilience::rate_limit::{InMemoryCounterStore, RateLimiter};
use vela_server::config::ServerConfig;
use vela_server::gate::RequestGate;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vela=info".parse().unwrap()))
        .json()
        .init();

    tracing::info!("Starting VELA server...");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(reason) => {
            tracing::error!(%reason, "configuration error");
            std::process::exit(1);
        }
    };

    let db = match DbManager::connect(&config.db).await {
        Ok(db) => db,
        Err(error) => {
            tracing::error!(%error, "failed to connect to SurrealDB");
            std::process::exit(1);
        }
    };
    if let Err(error) = run_migrations(db.client()).await {
        tracing::error!(%error, "migrations failed");
        std::process::exit(1);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let audit = Arc::new(AuditChain::new(
        SurrealAuditLogRepository::new(db.client().clone()),
        clock.clone(),
    ));

    let auth = Arc::new(AuthService::new(
        SurrealAccountRepository::new(db.client().clone()),
        SurrealSessionRepository::new(db.client().clone()),
        SurrealBlacklistRepository::new(db.client().clone()),
        SurrealFailedLoginRepository::new(db.client().clone()),
        Arc::clone(&audit),
        clock.clone(),
        config.auth.clone(),
    ));

    let limiter = RateLimiter::new(InMemoryCounterStore::default(), clock.clone());
    let _gate = RequestGate::new(limiter, Arc::clone(&auth));

    let breakers = Arc::new(CircuitBreakerRegistry::new(
        BreakerConfig::default(),
        clock.clone(),
    ));
    let _outbound = ResilientClient::new(breakers, ClientConfig::default());

    tracing::info!("Trust core initialized");

    // TODO: mount the REST surface (platform layer) on the gate
    // TODO: start the session/blacklist purge background task

    tracing::info!("VELA server stopped.");
}
