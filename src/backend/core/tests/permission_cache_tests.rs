//! Integration tests for decision and property → organization caching.

use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::cache::{InMemoryBackend, PermissionCache};
use gatehouse_core::config::AccessConfig;
use gatehouse_core::db::InMemoryAccessStore;
use gatehouse_core::rbac::{
    Actor, OrganizationId, Permission, PermissionEngine, Property, PropertyId, Scope,
    ScopedRoleGrant, UserId,
};

fn engine_over(store: &Arc<InMemoryAccessStore>, config: &AccessConfig) -> PermissionEngine {
    PermissionEngine::new(
        store.clone(),
        PermissionCache::new(Arc::new(InMemoryBackend::new()), config),
    )
}

fn property(id: i64, org: i64) -> Property {
    Property {
        id: PropertyId(id),
        organization_id: OrganizationId(org),
        admin_owner: None,
    }
}

// ============================================================================
// Property → Organization
// ============================================================================

#[tokio::test]
async fn test_invalidation_forces_fresh_read() {
    let store = Arc::new(InMemoryAccessStore::new());
    store.add_property(property(5, 1));
    let engine = engine_over(&store, &AccessConfig::default());

    assert_eq!(
        engine.organization_for_property(PropertyId(5)).await.unwrap(),
        Some(OrganizationId(1))
    );

    // Reassignment without invalidation is served stale from the cache.
    store.add_property(property(5, 2));
    let before = store.query_count();
    assert_eq!(
        engine.organization_for_property(PropertyId(5)).await.unwrap(),
        Some(OrganizationId(1))
    );
    assert_eq!(store.query_count(), before);

    engine.invalidate_property_org_cache(PropertyId(5)).await;
    assert_eq!(
        engine.organization_for_property(PropertyId(5)).await.unwrap(),
        Some(OrganizationId(2))
    );
    assert_eq!(store.query_count(), before + 1);
}

#[tokio::test]
async fn test_missing_property_is_not_cached() {
    let store = Arc::new(InMemoryAccessStore::new());
    let engine = engine_over(&store, &AccessConfig::default());

    assert_eq!(engine.organization_for_property(PropertyId(5)).await.unwrap(), None);

    store.add_property(property(5, 3));
    assert_eq!(
        engine.organization_for_property(PropertyId(5)).await.unwrap(),
        Some(OrganizationId(3))
    );
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn test_deleted_property_stays_cached_until_ttl() {
    let store = Arc::new(InMemoryAccessStore::new());
    store.add_property(property(5, 1));
    let engine = engine_over(&store, &AccessConfig::default());

    engine.organization_for_property(PropertyId(5)).await.unwrap();
    store.remove_property(PropertyId(5));

    assert_eq!(
        engine.organization_for_property(PropertyId(5)).await.unwrap(),
        Some(OrganizationId(1))
    );
}

#[tokio::test(start_paused = true)]
async fn test_property_org_entry_expires_after_a_day() {
    let store = Arc::new(InMemoryAccessStore::new());
    store.add_property(property(5, 1));
    let engine = engine_over(&store, &AccessConfig::default());

    engine.organization_for_property(PropertyId(5)).await.unwrap();
    store.add_property(property(5, 2));

    tokio::time::advance(Duration::from_secs(24 * 60 * 60 - 1)).await;
    assert_eq!(
        engine.organization_for_property(PropertyId(5)).await.unwrap(),
        Some(OrganizationId(1))
    );

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(
        engine.organization_for_property(PropertyId(5)).await.unwrap(),
        Some(OrganizationId(2))
    );
}

// ============================================================================
// Decisions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_decision_expires_after_ten_minutes() {
    let store = Arc::new(InMemoryAccessStore::with_default_roles());
    let engine = engine_over(&store, &AccessConfig::default());
    let actor = Actor::tenant(UserId(42), PropertyId(5));

    assert!(engine
        .has_permission(&actor, "payment", "read", Scope::global())
        .await
        .unwrap());

    // Revocation is invisible while the decision is cached.
    store.remove_role_permission("tenant", &Permission::new("payment", "read"));
    tokio::time::advance(Duration::from_secs(9 * 60)).await;
    assert!(engine
        .has_permission(&actor, "payment", "read", Scope::global())
        .await
        .unwrap());

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(!engine
        .has_permission(&actor, "payment", "read", Scope::global())
        .await
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_configured_decision_ttl() {
    let store = Arc::new(InMemoryAccessStore::with_default_roles());
    let config = AccessConfig {
        decision_ttl: Duration::from_secs(30),
        ..AccessConfig::default()
    };
    let engine = engine_over(&store, &config);
    let actor = Actor::tenant(UserId(42), PropertyId(5));

    engine
        .has_permission(&actor, "payment", "read", Scope::global())
        .await
        .unwrap();
    let after_first = store.query_count();

    tokio::time::advance(Duration::from_secs(31)).await;
    engine
        .has_permission(&actor, "payment", "read", Scope::global())
        .await
        .unwrap();
    assert!(store.query_count() > after_first);
}

#[tokio::test]
async fn test_actor_invalidation_applies_revocation() {
    let store = Arc::new(InMemoryAccessStore::with_default_roles());
    let engine = engine_over(&store, &AccessConfig::default());
    let actor = Actor::tenant(UserId(42), PropertyId(5));
    let other = Actor::tenant(UserId(43), PropertyId(5));

    for who in [&actor, &other] {
        assert!(engine
            .has_permission(who, "payment", "read", Scope::global())
            .await
            .unwrap());
    }

    store.remove_role_permission("tenant", &Permission::new("payment", "read"));
    assert_eq!(engine.invalidate_actor_permissions(UserId(42)).await, 1);

    assert!(!engine
        .has_permission(&actor, "payment", "read", Scope::global())
        .await
        .unwrap());
    // Untouched actor still sees the cached decision.
    assert!(engine
        .has_permission(&other, "payment", "read", Scope::global())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_decisions_not_shared_across_scopes() {
    let store = Arc::new(InMemoryAccessStore::with_default_roles());
    store.add_grant(ScopedRoleGrant::new(UserId(4), "property_manager").at_property(PropertyId(5)));
    let engine = engine_over(&store, &AccessConfig::default());
    let actor = Actor::tenant(UserId(4), PropertyId(5));

    assert!(engine
        .has_permission(&actor, "tenant", "delete", Scope::property(PropertyId(5)))
        .await
        .unwrap());
    assert!(!engine
        .has_permission(&actor, "tenant", "delete", Scope::property(PropertyId(6)))
        .await
        .unwrap());
    assert!(!engine
        .has_permission(&actor, "tenant", "delete", Scope::global())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_colon_in_permission_does_not_share_decision() {
    let store = Arc::new(InMemoryAccessStore::new());
    store.add_role_permission("property_admin", Permission::new("report:export", "all"));
    let engine = engine_over(&store, &AccessConfig::default());
    let admin = Actor::admin(UserId(3), []);

    assert!(!engine
        .has_permission(&admin, "report", "export:all", Scope::global())
        .await
        .unwrap());
    assert!(engine
        .has_permission(&admin, "report:export", "all", Scope::global())
        .await
        .unwrap());
}
