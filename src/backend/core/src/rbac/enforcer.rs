//! [`AccessGuard`]: the single entry point request handlers call.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::guards::HierarchyGuards;
use super::models::{
    Actor, OrganizationId, Permission, PropertyId, ResourceKind, Scope, TenantId, UserId,
};
use super::policy::PermissionEngine;
use crate::cache::{CacheBackend, PermissionCache, RedisBackend};
use crate::config::{AccessConfig, Config};
use crate::db::{AccessStore, Database};
use crate::error::{GatehouseError, Result};
use crate::scope::{AccessContext, RequestScope, ScopeResolver};
use crate::telemetry::metrics::{describe_metrics, record_denial};

/// Permission checks plus hierarchy guards over a shared store and cache.
///
/// Cheap to clone; clones share the store handle and cache backend.
#[derive(Clone)]
pub struct AccessGuard {
    engine: PermissionEngine,
    guards: HierarchyGuards,
    scopes: ScopeResolver,
}

impl AccessGuard {
    pub fn new(
        store: Arc<dyn AccessStore>,
        cache: Arc<dyn CacheBackend>,
        config: &AccessConfig,
    ) -> Self {
        let engine = PermissionEngine::new(store, PermissionCache::new(cache, config));
        Self::from_engine(engine, config)
    }

    pub fn from_engine(engine: PermissionEngine, config: &AccessConfig) -> Self {
        Self {
            guards: HierarchyGuards::new(engine.clone(), config.enforce_property_ownership),
            scopes: ScopeResolver::new(engine.clone()),
            engine,
        }
    }

    /// Connect to PostgreSQL and Redis using `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let database = Database::connect(&config.database).await?;
        let cache = RedisBackend::connect(&config.redis).await?;
        describe_metrics();
        info!(
            enforce_property_ownership = config.access.enforce_property_ownership,
            "Access guard ready"
        );
        Ok(Self::new(
            Arc::new(database.access_store()),
            Arc::new(cache),
            &config.access,
        ))
    }

    pub fn engine(&self) -> &PermissionEngine {
        &self.engine
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry point
    // ─────────────────────────────────────────────────────────────────────────

    /// Check the permission, then the one hierarchy guard matching the
    /// resource kind. Every denial is `Access denied` or a
    /// `... scope required` variant.
    #[instrument(skip(self, actor, context), fields(actor = ?actor.id, role = %actor.legacy_role))]
    pub async fn ensure_permission(
        &self,
        actor: &Actor,
        resource: &str,
        action: &str,
        context: &AccessContext,
    ) -> Result<()> {
        let permission = Permission::new(resource, action);
        let kind = permission.kind();

        let mut resolved = self.scopes.resolve_for_check(actor, &kind, context).await?;

        // Nothing past this gate runs for a denied permission.
        if !self.engine.check(actor, &permission, &resolved.scope()).await? {
            debug!(permission = %permission, "Permission denied");
            record_denial("permission");
            return Err(GatehouseError::access_denied());
        }

        self.scopes
            .resolve_after_check(&kind, context, &mut resolved)
            .await?;

        if kind == ResourceKind::Property {
            self.guards
                .ensure_property_access(actor, resolved.property_id)
                .await
        } else if kind.is_organization_scoped() {
            self.guards
                .ensure_organization_access(actor, resolved.organization_id)
                .await
        } else if kind.is_tenant_scoped() {
            match resolved.tenant_id {
                Some(tenant_id) => self.guards.ensure_tenant_access(actor, tenant_id).await,
                None => Ok(()),
            }
        } else {
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Individual checks
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn has_permission(
        &self,
        actor: &Actor,
        resource: &str,
        action: &str,
        scope: Scope,
    ) -> Result<bool> {
        self.engine.has_permission(actor, resource, action, scope).await
    }

    pub async fn ensure_property_access(
        &self,
        actor: &Actor,
        property_id: impl Into<Option<PropertyId>> + Send,
    ) -> Result<()> {
        self.guards.ensure_property_access(actor, property_id).await
    }

    pub async fn ensure_organization_access(
        &self,
        actor: &Actor,
        organization_id: impl Into<Option<OrganizationId>> + Send,
    ) -> Result<()> {
        self.guards
            .ensure_organization_access(actor, organization_id)
            .await
    }

    pub async fn ensure_tenant_access(
        &self,
        actor: &Actor,
        tenant_id: impl Into<Option<TenantId>> + Send,
    ) -> Result<()> {
        self.guards.ensure_tenant_access(actor, tenant_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache maintenance
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn organization_id_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Option<OrganizationId>> {
        self.engine.organization_for_property(property_id).await
    }

    /// Call after reassigning a property to another organization.
    pub async fn invalidate_property_org_cache(&self, property_id: PropertyId) {
        self.engine.invalidate_property_org_cache(property_id).await
    }

    /// Call after changing an actor's grants.
    pub async fn invalidate_actor_permissions(&self, user_id: UserId) -> u64 {
        self.engine.invalidate_actor_permissions(user_id).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request scope
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn request_scope(
        &self,
        actor: &Actor,
        property_id: Option<PropertyId>,
        organization_id: Option<OrganizationId>,
    ) -> Result<RequestScope> {
        self.scopes
            .request_scope(actor, property_id, organization_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryBackend;
    use crate::db::InMemoryAccessStore;
    use crate::error::ErrorCode;
    use crate::rbac::models::{PaymentId, Property, TenantRecord};

    fn setup() -> (Arc<InMemoryAccessStore>, AccessGuard) {
        let store = Arc::new(InMemoryAccessStore::with_default_roles());
        store.add_property(Property {
            id: PropertyId(5),
            organization_id: OrganizationId(2),
            admin_owner: None,
        });
        let guard = AccessGuard::new(
            store.clone(),
            Arc::new(InMemoryBackend::new()),
            &AccessConfig::default(),
        );
        (store, guard)
    }

    #[tokio::test]
    async fn test_denied_permission_skips_entity_lookups() {
        let (store, guard) = setup();
        store.add_payment(PaymentId(1), TenantId(7));
        let actor = Actor::tenant(UserId(42), PropertyId(5));

        store.reset_query_count();
        let err = guard
            .ensure_permission(
                &actor,
                "payment",
                "delete",
                &AccessContext::new().with_payment(PaymentId(1)),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::AccessDenied);
        // organization lookup, scoped grants, legacy role: no payment lookup.
        assert_eq!(store.query_count(), 3);
    }

    #[tokio::test]
    async fn test_payment_resolves_tenant_after_gate() {
        let (store, guard) = setup();
        store.add_payment(PaymentId(1), TenantId(8));
        store.add_tenant(TenantRecord {
            id: TenantId(8),
            user_id: Some(UserId(99)),
            property_id: Some(PropertyId(5)),
        });
        let actor = Actor::tenant(UserId(42), PropertyId(5));

        let result = guard
            .ensure_permission(
                &actor,
                "payment",
                "read",
                &AccessContext::new().with_payment(PaymentId(1)),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tenant_resource_without_tenant_id_passes_after_gate() {
        let (_store, guard) = setup();
        let actor = Actor::tenant(UserId(42), PropertyId(5));

        assert!(guard
            .ensure_permission(&actor, "maintenance", "create", &AccessContext::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unguarded_resource_passes_after_gate() {
        let (store, guard) = setup();
        store.add_role_permission("property_admin", Permission::new("report", "read"));
        let actor = Actor::admin(UserId(3), []);

        assert!(guard
            .ensure_permission(&actor, "report", "read", &AccessContext::new())
            .await
            .is_ok());
        assert!(guard
            .ensure_permission(&actor, "report", "export", &AccessContext::new())
            .await
            .is_err());
    }
}
