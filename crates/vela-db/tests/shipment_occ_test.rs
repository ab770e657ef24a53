//! Optimistic-concurrency tests for the shipment repository.

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

use vela_core::error::VelaError;
use vela_core::models::shipment::{CreateShipment, ShipmentStatus, UpdateShipment};
use vela_core::repository::ShipmentRepository;
use vela_db::repository::SurrealShipmentRepository;

async fn setup() -> (SurrealShipmentRepository<Db>, Uuid, Surreal<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    vela_db::run_migrations(&db).await.unwrap();

    (SurrealShipmentRepository::new(db.clone()), Uuid::new_v4(), db)
}

fn create_input(tenant_id: Uuid, reference: &str) -> CreateShipment {
    CreateShipment {
        tenant_id,
        reference: reference.into(),
        consignee: "Hanseatic Imports GmbH".into(),
        destination: "DEHAM".into(),
        currency: "EUR".into(),
        value_cents: 1_250_000,
    }
}

#[tokio::test]
async fn create_starts_at_version_one() {
    let (repo, tenant_id, _db) = setup().await;
    let shipment = repo.create(create_input(tenant_id, "EXP-2026-0001")).await.unwrap();

    assert_eq!(shipment.version, 1);
    assert_eq!(shipment.status, ShipmentStatus::Draft);
    assert_eq!(shipment.tenant_id, tenant_id);
}

#[tokio::test]
async fn matching_version_updates_and_increments() {
    let (repo, tenant_id, _db) = setup().await;
    let shipment = repo.create(create_input(tenant_id, "EXP-2026-0001")).await.unwrap();

    let updated = repo
        .update_versioned(
            tenant_id,
            shipment.id,
            1,
            UpdateShipment {
                status: Some(ShipmentStatus::InTransit),
                ..UpdateShipment::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.status, ShipmentStatus::InTransit);
    assert_eq!(updated.consignee, "Hanseatic Imports GmbH");
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let (repo, tenant_id, _db) = setup().await;
    let shipment = repo.create(create_input(tenant_id, "EXP-2026-0001")).await.unwrap();

    // Two writers both read version 1; the first wins.
    repo.update_versioned(
        tenant_id,
        shipment.id,
        1,
        UpdateShipment {
            consignee: Some("Nordsee Handels AG".into()),
            ..UpdateShipment::default()
        },
    )
    .await
    .unwrap();

    let err = repo
        .update_versioned(
            tenant_id,
            shipment.id,
            1,
            UpdateShipment {
                destination: Some("NLRTM".into()),
                ..UpdateShipment::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VelaError::Conflict { .. }));

    // The losing write left no trace.
    let current = repo.get_by_id(tenant_id, shipment.id).await.unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.destination, "DEHAM");
    assert_eq!(current.consignee, "Nordsee Handels AG");
}

#[tokio::test]
async fn concurrent_writers_exactly_one_wins() {
    let (repo, tenant_id, _db) = setup().await;
    let shipment = repo.create(create_input(tenant_id, "EXP-2026-0001")).await.unwrap();

    let a = repo.update_versioned(
        tenant_id,
        shipment.id,
        1,
        UpdateShipment {
            value_cents: Some(2_000_000),
            ..UpdateShipment::default()
        },
    );
    let b = repo.update_versioned(
        tenant_id,
        shipment.id,
        1,
        UpdateShipment {
            value_cents: Some(3_000_000),
            ..UpdateShipment::default()
        },
    );

    let (a, b) = tokio::join!(a, b);
    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let current = repo.get_by_id(tenant_id, shipment.id).await.unwrap();
    assert_eq!(current.version, 2);
}

#[tokio::test]
async fn missing_row_is_not_found_not_conflict() {
    let (repo, tenant_id, _db) = setup().await;

    let err = repo
        .update_versioned(tenant_id, Uuid::new_v4(), 1, UpdateShipment::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VelaError::NotFound { .. }));
}

#[tokio::test]
async fn cross_tenant_rows_are_hidden() {
    let (repo, tenant_id, _db) = setup().await;
    let shipment = repo.create(create_input(tenant_id, "EXP-2026-0001")).await.unwrap();

    let other_tenant = Uuid::new_v4();
    let err = repo.get_by_id(other_tenant, shipment.id).await.unwrap_err();
    assert!(matches!(err, VelaError::NotFound { .. }));

    let err = repo
        .update_versioned(other_tenant, shipment.id, 1, UpdateShipment::default())
        .await
        .unwrap_err();
    assert!(matches!(err, VelaError::NotFound { .. }));
}
