//! Role-based access control over the property / organization / tenant
//! hierarchy.
//!
//! This module provides:
//! - **Models**: actors, scoped role grants, permissions and hierarchy records
//! - **Policy Engine**: cached permission checks over an evaluator chain
//! - **Canonical Roles**: the modern role vocabulary and the legacy mapping
//! - **Hierarchy Guards**: property, organization and tenant-record ownership
//! - **Access Guard**: the `ensure_permission` entry point tying it together
//! - **Scope Injection Middleware**: ambient request scope for Axum handlers
//!
//! # Usage
//!
//! ```rust,ignore
//! use gatehouse_core::rbac::{AccessGuard, Actor};
//! use gatehouse_core::scope::AccessContext;
//!
//! let guard = AccessGuard::connect(&config).await?;
//!
//! guard
//!     .ensure_permission(&actor, "tenant", "read", &AccessContext::new().with_tenant(tenant_id))
//!     .await?;
//! ```

pub mod enforcer;
pub mod guards;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod roles;

pub use enforcer::AccessGuard;
pub use guards::HierarchyGuards;
pub use middleware::{ScopeInjectionLayer, ScopeInjectionService};
pub use models::{
    Actor, DocumentContext, DocumentId, GrantScope, LegacyRole, MaintenanceId, MemberRole,
    OrganizationId, OrganizationMember, PaymentId, Permission, Property, PropertyId,
    ResourceKind, Scope, ScopedRoleGrant, TenantId, TenantRecord, UserId,
};
pub use policy::{
    LegacyRoleEvaluator, PermissionEngine, PermissionEvaluator, PermissionQuery,
    ScopedGrantEvaluator,
};
pub use roles::CanonicalRole;
