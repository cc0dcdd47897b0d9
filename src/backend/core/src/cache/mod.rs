//! Shared cache for permission decisions and property → organization lookups.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               PermissionCache                 │
//! │   CacheKey naming · serde_json values · TTLs  │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!               CacheBackend trait
//!                        │
//!          ┌─────────────┴─────────────┐
//!          ▼                           ▼
//!   ┌─────────────┐             ┌─────────────┐
//!   │  In-Memory  │             │    Redis    │
//!   └─────────────┘             └─────────────┘
//! ```
//!
//! The cache is strictly an accelerator. A backend that errors, times out or
//! returns a value that does not decode is treated as a miss on read and as a
//! no-op on write; no cache failure ever reaches the caller.

pub mod backend;
pub mod key;

pub use backend::{CacheBackend, InMemoryBackend, RedisBackend};
pub use key::CacheKey;

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AccessConfig;
use crate::error::GatehouseError;
use crate::rbac::models::{OrganizationId, Permission, PropertyId, Scope, UserId};
use crate::telemetry::metrics::{record_cache_error, record_cache_lookup, CacheFamily};

/// Typed, failure-tolerant view over a [`CacheBackend`].
#[derive(Clone)]
pub struct PermissionCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    decision_ttl: Duration,
    property_org_ttl: Duration,
}

impl PermissionCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &AccessConfig) -> Self {
        Self {
            backend,
            prefix: config.cache_key_prefix.clone(),
            decision_ttl: config.decision_ttl,
            property_org_ttl: config.property_org_ttl,
        }
    }

    /// A cache over a fresh [`InMemoryBackend`].
    pub fn in_memory(config: &AccessConfig) -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), config)
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_decision(
        &self,
        actor: UserId,
        permission: &Permission,
        scope: &Scope,
    ) -> Option<bool> {
        let key = CacheKey::decision(&self.prefix, actor, permission, scope);
        self.read(&key, CacheFamily::Decision).await
    }

    pub async fn set_decision(
        &self,
        actor: UserId,
        permission: &Permission,
        scope: &Scope,
        allowed: bool,
    ) {
        let key = CacheKey::decision(&self.prefix, actor, permission, scope);
        self.write(&key, &allowed, self.decision_ttl).await;
    }

    /// Drop every cached decision for one actor. Returns how many were removed
    /// (zero when the backend failed).
    pub async fn invalidate_actor(&self, actor: UserId) -> u64 {
        let prefix = CacheKey::actor_prefix(&self.prefix, actor);
        match self.backend.delete_prefix(&prefix).await {
            Ok(deleted) => {
                debug!(actor = %actor, deleted, "Invalidated cached decisions");
                deleted
            }
            Err(e) => {
                warn!(actor = %actor, error = %e, backend = self.backend.name(), "Cache prefix delete failed");
                record_cache_error("delete_prefix");
                0
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Property → Organization
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_property_org(&self, property_id: PropertyId) -> Option<OrganizationId> {
        let key = CacheKey::property_organization(&self.prefix, property_id);
        self.read(&key, CacheFamily::PropertyOrganization).await
    }

    pub async fn set_property_org(&self, property_id: PropertyId, organization_id: OrganizationId) {
        let key = CacheKey::property_organization(&self.prefix, property_id);
        self.write(&key, &organization_id, self.property_org_ttl).await;
    }

    pub async fn invalidate_property_org(&self, property_id: PropertyId) {
        let key = CacheKey::property_organization(&self.prefix, property_id);
        if let Err(e) = self.backend.delete(key.as_str()).await {
            warn!(key = %key, error = %e, backend = self.backend.name(), "Cache delete failed");
            record_cache_error("delete");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Codec
    // ─────────────────────────────────────────────────────────────────────────

    async fn read<T: DeserializeOwned>(&self, key: &CacheKey, family: CacheFamily) -> Option<T> {
        let bytes = match self.backend.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                record_cache_lookup(family, false);
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, backend = self.backend.name(), "Cache read failed, treating as miss");
                record_cache_error("get");
                record_cache_lookup(family, false);
                return None;
            }
        };

        match serde_json::from_slice(&bytes).map_err(GatehouseError::from) {
            Ok(value) => {
                record_cache_lookup(family, true);
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, code = ?e.code(), error = %e, "Undecodable cache value, treating as miss");
                record_cache_error("decode");
                record_cache_lookup(family, false);
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value).map_err(GatehouseError::from) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, code = ?e.code(), error = %e, "Cache value failed to encode");
                record_cache_error("encode");
                return;
            }
        };

        if let Err(e) = self.backend.set(key.as_str(), bytes, ttl).await {
            warn!(key = %key, error = %e, backend = self.backend.name(), "Cache write failed");
            record_cache_error("set");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> PermissionCache {
        PermissionCache::in_memory(&AccessConfig::default())
    }

    #[tokio::test]
    async fn test_decision_roundtrip_is_scope_sensitive() {
        let cache = cache();
        let perm = Permission::new("tenant", "read");
        let at_five = Scope::property(PropertyId(5));

        cache.set_decision(UserId(1), &perm, &at_five, true).await;

        assert_eq!(cache.get_decision(UserId(1), &perm, &at_five).await, Some(true));
        assert_eq!(cache.get_decision(UserId(1), &perm, &Scope::global()).await, None);
        assert_eq!(cache.get_decision(UserId(2), &perm, &at_five).await, None);
    }

    #[tokio::test]
    async fn test_deny_is_cached() {
        let cache = cache();
        let perm = Permission::new("payment", "delete");
        cache.set_decision(UserId(1), &perm, &Scope::global(), false).await;
        assert_eq!(
            cache.get_decision(UserId(1), &perm, &Scope::global()).await,
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_undecodable_value_is_a_miss() {
        let cache = cache();
        let key = CacheKey::property_organization("gatehouse:", PropertyId(5));
        cache
            .backend()
            .set(key.as_str(), b"not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get_property_org(PropertyId(5)).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_actor_only_touches_that_actor() {
        let cache = cache();
        let perm = Permission::new("tenant", "read");
        cache.set_decision(UserId(1), &perm, &Scope::global(), true).await;
        cache.set_decision(UserId(1), &perm, &Scope::property(PropertyId(5)), true).await;
        cache.set_decision(UserId(10), &perm, &Scope::global(), true).await;

        assert_eq!(cache.invalidate_actor(UserId(1)).await, 2);
        assert_eq!(cache.get_decision(UserId(1), &perm, &Scope::global()).await, None);
        assert_eq!(cache.get_decision(UserId(10), &perm, &Scope::global()).await, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_property_org_ttl() {
        let cache = cache();
        cache.set_property_org(PropertyId(5), OrganizationId(2)).await;
        assert_eq!(cache.get_property_org(PropertyId(5)).await, Some(OrganizationId(2)));

        tokio::time::advance(Duration::from_secs(23 * 60 * 60)).await;
        assert_eq!(cache.get_property_org(PropertyId(5)).await, Some(OrganizationId(2)));

        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        assert_eq!(cache.get_property_org(PropertyId(5)).await, None);
    }
}
