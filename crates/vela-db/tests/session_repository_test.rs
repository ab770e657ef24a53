//! Session state-machine tests against the SurrealDB repository.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

use vela_core::error::VelaError;
use vela_core::models::session::{CreateSession, RevokeReason, SessionState};
use vela_core::repository::SessionRepository;
use vela_db::repository::SurrealSessionRepository;

async fn setup() -> (SurrealSessionRepository<Db>, Uuid, Uuid, Surreal<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    vela_db::run_migrations(&db).await.unwrap();

    (
        SurrealSessionRepository::new(db.clone()),
        Uuid::new_v4(),
        Uuid::new_v4(),
        db,
    )
}

fn create_input(tenant_id: Uuid, account_id: Uuid, token_hash: &str) -> CreateSession {
    CreateSession {
        tenant_id,
        account_id,
        token_hash: token_hash.into(),
        device_fingerprint: "fp-laptop".into(),
        ip_address: "203.0.113.7".into(),
        user_agent: "TestAgent/1.0".into(),
        expires_at: Utc::now() + Duration::days(30),
    }
}

#[tokio::test]
async fn created_sessions_are_active() {
    let (repo, tenant_id, account_id, _db) = setup().await;
    let session = repo
        .create(create_input(tenant_id, account_id, "hash-1"))
        .await
        .unwrap();

    assert_eq!(session.state, SessionState::Active);
    assert!(session.revoke_reason.is_none());

    let found = repo.get_by_token_hash(tenant_id, "hash-1").await.unwrap();
    assert_eq!(found.id, session.id);
}

#[tokio::test]
async fn terminal_sessions_are_still_found_by_hash() {
    let (repo, tenant_id, account_id, _db) = setup().await;
    let session = repo
        .create(create_input(tenant_id, account_id, "hash-1"))
        .await
        .unwrap();

    repo.mark_superseded(tenant_id, session.id).await.unwrap();

    // The theft signal depends on this lookup returning the
    // superseded row instead of NotFound.
    let found = repo.get_by_token_hash(tenant_id, "hash-1").await.unwrap();
    assert_eq!(found.state, SessionState::Superseded);
}

#[tokio::test]
async fn supersede_is_single_shot() {
    let (repo, tenant_id, account_id, _db) = setup().await;
    let session = repo
        .create(create_input(tenant_id, account_id, "hash-1"))
        .await
        .unwrap();

    repo.mark_superseded(tenant_id, session.id).await.unwrap();

    // The second transition loses: at most one refresh succeeds per
    // issued token.
    let err = repo.mark_superseded(tenant_id, session.id).await.unwrap_err();
    assert!(matches!(err, VelaError::Conflict { .. }));
}

#[tokio::test]
async fn revoke_records_the_reason() {
    let (repo, tenant_id, account_id, _db) = setup().await;
    let session = repo
        .create(create_input(tenant_id, account_id, "hash-1"))
        .await
        .unwrap();

    repo.revoke(tenant_id, session.id, RevokeReason::PasswordChange)
        .await
        .unwrap();

    let found = repo.get_by_id(tenant_id, session.id).await.unwrap();
    assert_eq!(found.state, SessionState::Revoked);
    assert_eq!(found.revoke_reason, Some(RevokeReason::PasswordChange));
}

#[tokio::test]
async fn revoke_all_spares_the_exception_and_returns_the_rest() {
    let (repo, tenant_id, account_id, _db) = setup().await;
    let mut ids = Vec::new();
    for n in 0..3 {
        let mut input = create_input(tenant_id, account_id, &format!("hash-{n}"));
        input.device_fingerprint = format!("fp-{n}");
        ids.push(repo.create(input).await.unwrap().id);
    }

    let revoked = repo
        .revoke_all(tenant_id, account_id, RevokeReason::LogoutAll, Some(ids[0]))
        .await
        .unwrap();

    assert_eq!(revoked.len(), 2);
    assert!(revoked.iter().all(|s| s.id != ids[0]));

    let remaining = repo.list_active(tenant_id, account_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, ids[0]);
}

#[tokio::test]
async fn fingerprint_lookup_only_sees_active_sessions() {
    let (repo, tenant_id, account_id, _db) = setup().await;
    let session = repo
        .create(create_input(tenant_id, account_id, "hash-1"))
        .await
        .unwrap();

    let found = repo
        .find_active_by_fingerprint(tenant_id, account_id, "fp-laptop")
        .await
        .unwrap();
    assert_eq!(found.map(|s| s.id), Some(session.id));

    repo.revoke(tenant_id, session.id, RevokeReason::Logout)
        .await
        .unwrap();

    let found = repo
        .find_active_by_fingerprint(tenant_id, account_id, "fp-laptop")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn sessions_are_tenant_scoped() {
    let (repo, tenant_id, account_id, _db) = setup().await;
    let session = repo
        .create(create_input(tenant_id, account_id, "hash-1"))
        .await
        .unwrap();

    let other_tenant = Uuid::new_v4();
    assert!(matches!(
        repo.get_by_id(other_tenant, session.id).await.unwrap_err(),
        VelaError::NotFound { .. }
    ));
    assert!(matches!(
        repo.get_by_token_hash(other_tenant, "hash-1").await.unwrap_err(),
        VelaError::NotFound { .. }
    ));
}

#[tokio::test]
async fn cleanup_removes_only_expired_sessions() {
    let (repo, tenant_id, account_id, _db) = setup().await;

    let mut expired = create_input(tenant_id, account_id, "hash-old");
    expired.expires_at = Utc::now() - Duration::hours(1);
    repo.create(expired).await.unwrap();
    repo.create(create_input(tenant_id, account_id, "hash-live"))
        .await
        .unwrap();

    let removed = repo.cleanup_expired(tenant_id).await.unwrap();
    assert_eq!(removed, 1);

    assert!(repo.get_by_token_hash(tenant_id, "hash-old").await.is_err());
    assert!(repo.get_by_token_hash(tenant_id, "hash-live").await.is_ok());
}
