#![allow(clippy::result_large_err)]
//! # Gatehouse Core
//!
//! Access-control resolution for a property-management platform.
//!
//! ## Architecture
//!
//! - **Permission Engine**: scoped role grants first, legacy flat role as fallback
//! - **Hierarchy Guards**: property, organization and tenant-record ownership checks
//! - **Scope Resolution**: fills missing property/organization/tenant ids from
//!   request defaults and stored records
//! - **Cache**: shared decision and property → organization cache (in-memory or Redis)
//! - **Store**: read-only PostgreSQL access via sqlx, plus an in-memory store
//! - **Telemetry**: structured logging and decision/cache metrics
//!
//! ```text
//! request → ScopeInjectionLayer → AccessGuard::ensure_permission
//!              │                       │
//!              │              ScopeResolver (context, document, org lookup)
//!              │                       │
//!              │              PermissionEngine::check (cache, then store)
//!              │                       │
//!              └──────────────► HierarchyGuards (one per resource kind)
//! ```

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod rbac;
pub mod scope;
pub mod telemetry;

pub use error::{ErrorCode, ErrorSeverity, GatehouseError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheBackend, InMemoryBackend, PermissionCache, RedisBackend};
    pub use crate::config::{AccessConfig, Config};
    pub use crate::db::{AccessStore, Database, InMemoryAccessStore, PgAccessStore};
    pub use crate::error::{ErrorCode, ErrorSeverity, GatehouseError, Result};
    pub use crate::rbac::{
        AccessGuard, Actor, CanonicalRole, GrantScope, HierarchyGuards, LegacyRole,
        OrganizationId, Permission, PermissionEngine, PropertyId, ResourceKind, Scope,
        ScopeInjectionLayer, ScopedRoleGrant, TenantId, UserId,
    };
    pub use crate::scope::{AccessContext, RequestScope, ScopeResolver};
}
