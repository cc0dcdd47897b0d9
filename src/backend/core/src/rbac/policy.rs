//! Permission engine for evaluating authorization decisions.
//!
//! The engine answers the question:
//! "Can actor X perform action Y on resource type Z within scope S?"
//!
//! Decisions come from an ordered chain of [`PermissionEvaluator`]s. The
//! scoped-grant evaluator runs first; the legacy flat-role evaluator is the
//! fallback while actors still carry the old role column.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::models::{Actor, OrganizationId, Permission, PropertyId, Scope, UserId};
use super::roles::CanonicalRole;
use crate::cache::PermissionCache;
use crate::db::AccessStore;
use crate::error::Result;
use crate::telemetry::metrics::{record_decision, DecisionPath};

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluators
// ═══════════════════════════════════════════════════════════════════════════════

/// One question put to the evaluator chain.
#[derive(Debug, Clone, Copy)]
pub struct PermissionQuery<'a> {
    pub actor: &'a Actor,
    pub user_id: UserId,
    pub permission: &'a Permission,
    pub scope: &'a Scope,
}

/// A single source of "allow" answers.
///
/// Returning `Ok(false)` passes the question to the next evaluator; it is not
/// a veto.
#[async_trait]
pub trait PermissionEvaluator: Send + Sync {
    /// Metric label for decisions this evaluator produces.
    fn path(&self) -> DecisionPath;

    async fn evaluate(&self, query: &PermissionQuery<'_>) -> Result<bool>;
}

/// Allows when the actor holds a currently-valid grant whose role carries the
/// permission and whose own scope covers the requested scope.
pub struct ScopedGrantEvaluator {
    store: Arc<dyn AccessStore>,
}

impl ScopedGrantEvaluator {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PermissionEvaluator for ScopedGrantEvaluator {
    fn path(&self) -> DecisionPath {
        DecisionPath::ScopedGrant
    }

    async fn evaluate(&self, query: &PermissionQuery<'_>) -> Result<bool> {
        let now = Utc::now();
        let grants = self
            .store
            .grants_with_permission(query.user_id, query.permission)
            .await?;

        let matched = grants
            .iter()
            .find(|grant| grant.is_active_at(now) && grant.covers(query.scope));

        if let Some(grant) = matched {
            debug!(
                user_id = %query.user_id,
                permission = %query.permission,
                role = %grant.role,
                "Permission granted by scoped grant"
            );
        }
        Ok(matched.is_some())
    }
}

/// Maps the legacy role to its canonical role and checks that role's
/// permissions, ignoring scope.
pub struct LegacyRoleEvaluator {
    store: Arc<dyn AccessStore>,
}

impl LegacyRoleEvaluator {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PermissionEvaluator for LegacyRoleEvaluator {
    fn path(&self) -> DecisionPath {
        DecisionPath::LegacyRole
    }

    async fn evaluate(&self, query: &PermissionQuery<'_>) -> Result<bool> {
        let Some(role) = CanonicalRole::from_legacy(&query.actor.legacy_role) else {
            return Ok(false);
        };
        self.store
            .role_has_permission(role.id(), query.permission)
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Cached permission checks over an evaluator chain.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct PermissionEngine {
    store: Arc<dyn AccessStore>,
    cache: PermissionCache,
    evaluators: Arc<Vec<Arc<dyn PermissionEvaluator>>>,
}

impl PermissionEngine {
    /// Engine with the standard chain: scoped grants, then legacy role.
    pub fn new(store: Arc<dyn AccessStore>, cache: PermissionCache) -> Self {
        let evaluators: Vec<Arc<dyn PermissionEvaluator>> = vec![
            Arc::new(ScopedGrantEvaluator::new(store.clone())),
            Arc::new(LegacyRoleEvaluator::new(store.clone())),
        ];
        Self::with_evaluators(store, cache, evaluators)
    }

    pub fn with_evaluators(
        store: Arc<dyn AccessStore>,
        cache: PermissionCache,
        evaluators: Vec<Arc<dyn PermissionEvaluator>>,
    ) -> Self {
        Self {
            store,
            cache,
            evaluators: Arc::new(evaluators),
        }
    }

    pub fn store(&self) -> &Arc<dyn AccessStore> {
        &self.store
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission checks
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `actor` may perform `action` on `resource` within `scope`.
    ///
    /// A normal deny is `Ok(false)`. Only store failures are errors; cache
    /// failures fall through to the store.
    pub async fn has_permission(
        &self,
        actor: &Actor,
        resource: &str,
        action: &str,
        scope: Scope,
    ) -> Result<bool> {
        self.check(actor, &Permission::new(resource, action), &scope)
            .await
    }

    #[instrument(skip(self, actor, permission), fields(actor = ?actor.id, role = %actor.legacy_role, permission = %permission))]
    pub async fn check(&self, actor: &Actor, permission: &Permission, scope: &Scope) -> Result<bool> {
        let Some(user_id) = actor.id else {
            record_decision(false, DecisionPath::Default);
            return Ok(false);
        };

        // Unknown legacy roles are denied outright, before any grant lookup.
        if !actor.legacy_role.is_recognized() {
            debug!(role = %actor.legacy_role, "Unrecognized legacy role");
            record_decision(false, DecisionPath::Default);
            return Ok(false);
        }

        if let Some(allowed) = self.cache.get_decision(user_id, permission, scope).await {
            record_decision(allowed, DecisionPath::Cache);
            return Ok(allowed);
        }

        let query = PermissionQuery {
            actor,
            user_id,
            permission,
            scope,
        };

        let mut decided = DecisionPath::Default;
        for evaluator in self.evaluators.iter() {
            if evaluator.evaluate(&query).await? {
                decided = evaluator.path();
                break;
            }
        }
        let allowed = decided != DecisionPath::Default;

        self.cache
            .set_decision(user_id, permission, scope, allowed)
            .await;
        record_decision(allowed, decided);

        Ok(allowed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Property → Organization
    // ─────────────────────────────────────────────────────────────────────────

    /// The organization owning a property, read through the cache.
    ///
    /// Only found organizations are cached; a missing property is looked up
    /// again on the next call.
    #[instrument(skip(self))]
    pub async fn organization_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Option<OrganizationId>> {
        if let Some(org) = self.cache.get_property_org(property_id).await {
            return Ok(Some(org));
        }

        let org = self.store.organization_for_property(property_id).await?;
        if let Some(org) = org {
            self.cache.set_property_org(property_id, org).await;
        }
        Ok(org)
    }

    /// Must be called whenever a property moves to another organization.
    pub async fn invalidate_property_org_cache(&self, property_id: PropertyId) {
        self.cache.invalidate_property_org(property_id).await;
    }

    /// Drop every cached decision for an actor, e.g. after their grants change.
    pub async fn invalidate_actor_permissions(&self, user_id: UserId) -> u64 {
        self.cache.invalidate_actor(user_id).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessConfig;
    use crate::db::InMemoryAccessStore;
    use crate::rbac::models::{LegacyRole, ScopedRoleGrant};

    fn setup() -> (Arc<InMemoryAccessStore>, PermissionEngine) {
        let store = Arc::new(InMemoryAccessStore::with_default_roles());
        let engine = PermissionEngine::new(
            store.clone(),
            PermissionCache::in_memory(&AccessConfig::default()),
        );
        (store, engine)
    }

    #[tokio::test]
    async fn test_missing_actor_id_denies_without_query() {
        let (store, engine) = setup();
        let actor = Actor {
            id: None,
            legacy_role: LegacyRole::SuperAdmin,
            properties: vec![],
            property_id: None,
        };

        assert!(!engine
            .has_permission(&actor, "tenant", "read", Scope::global())
            .await
            .unwrap());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_unrecognized_legacy_role_skips_scoped_path() {
        let (store, engine) = setup();
        store.add_grant(ScopedRoleGrant::new(UserId(7), "org_owner"));
        let actor = Actor::new(UserId(7), LegacyRole::parse("landlord"));

        assert!(!engine
            .has_permission(&actor, "tenant", "read", Scope::global())
            .await
            .unwrap());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_scoped_grant_takes_priority() {
        let (store, engine) = setup();
        store.add_grant(ScopedRoleGrant::new(UserId(4), "property_manager").at_property(PropertyId(5)));
        let actor = Actor::tenant(UserId(4), PropertyId(5));

        // tenant:delete is not a tenant-role permission, only the grant carries it.
        assert!(engine
            .has_permission(&actor, "tenant", "delete", Scope::property(PropertyId(5)))
            .await
            .unwrap());
        assert!(!engine
            .has_permission(&actor, "tenant", "delete", Scope::property(PropertyId(6)))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_legacy_fallback_ignores_scope() {
        let (_store, engine) = setup();
        let actor = Actor::tenant(UserId(42), PropertyId(5));

        for scope in [Scope::global(), Scope::property(PropertyId(99))] {
            assert!(engine
                .has_permission(&actor, "payment", "read", scope)
                .await
                .unwrap());
        }
        assert!(!engine
            .has_permission(&actor, "property", "update", Scope::global())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_decision_is_cached() {
        let (store, engine) = setup();
        let actor = Actor::admin(UserId(3), [PropertyId(5)]);

        assert!(engine
            .has_permission(&actor, "tenant", "read", Scope::global())
            .await
            .unwrap());
        let after_first = store.query_count();

        assert!(engine
            .has_permission(&actor, "tenant", "read", Scope::global())
            .await
            .unwrap());
        assert_eq!(store.query_count(), after_first);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let (store, engine) = setup();
        store.set_failing(true);
        let actor = Actor::admin(UserId(3), []);

        assert!(engine
            .has_permission(&actor, "tenant", "read", Scope::global())
            .await
            .is_err());
    }
}
