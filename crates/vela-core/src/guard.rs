//! Ownership guard — defense-in-depth tenant check.
//!
//! Every repository query is already pre-filtered by `tenant_id`; the
//! guard re-checks the loaded resource against the caller before any
//! handler touches it. A mismatch reports `NotFound`, never
//! `Forbidden`: resource existence must not leak across tenants.

use uuid::Uuid;

use crate::error::{VelaError, VelaResult};
use crate::models::principal::Principal;

/// A resource that belongs to exactly one tenant.
pub trait TenantOwned {
    fn tenant_id(&self) -> Uuid;
    fn id(&self) -> Uuid;
}

/// Verify that `principal`'s tenant owns `resource`.
///
/// Returns the resource unchanged on success so the guard composes
/// inline with a fetch: `verify_ownership(&p, repo.get(..).await?, "shipment")?`.
pub fn verify_ownership<T: TenantOwned>(
    principal: &Principal,
    resource: T,
    entity: &str,
) -> VelaResult<T> {
    if resource.tenant_id() != principal.tenant_id {
        return Err(VelaError::NotFound {
            entity: entity.into(),
            id: resource.id().to_string(),
        });
    }
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::principal::Role;

    #[derive(Debug)]
    struct Doc {
        id: Uuid,
        tenant_id: Uuid,
    }

    impl TenantOwned for Doc {
        fn tenant_id(&self) -> Uuid {
            self.tenant_id
        }
        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn principal(tenant_id: Uuid) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            tenant_id,
            role: Role::Operations,
            email: "ops@acme.example".into(),
        }
    }

    #[test]
    fn same_tenant_passes() {
        let tenant = Uuid::new_v4();
        let doc = Doc {
            id: Uuid::new_v4(),
            tenant_id: tenant,
        };
        assert!(verify_ownership(&principal(tenant), doc, "doc").is_ok());
    }

    #[test]
    fn cross_tenant_is_not_found() {
        let doc = Doc {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
        };
        let err = verify_ownership(&principal(Uuid::new_v4()), doc, "doc").unwrap_err();
        // NotFound, not a Forbidden variant: existence must not leak.
        assert!(matches!(err, VelaError::NotFound { .. }));
    }
}
