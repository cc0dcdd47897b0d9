//! The read-only store interface the access engine consumes.
//!
//! Grants, role permissions, ownership and membership rows are owned and
//! mutated by other services; the engine only reads them through this trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::rbac::models::{
    DocumentContext, DocumentId, MaintenanceId, OrganizationId, PaymentId, Permission, PropertyId,
    ScopedRoleGrant, TenantId, TenantRecord, UserId,
};

/// Read-only access to the relational schema behind authorization decisions.
///
/// Lookups for absent rows return `Ok(None)` / `Ok(false)`; only infrastructure
/// failures are errors, and callers propagate them unchanged.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Every grant held by `user_id` whose role carries `permission`,
    /// regardless of validity window or scope.
    async fn grants_with_permission(
        &self,
        user_id: UserId,
        permission: &Permission,
    ) -> Result<Vec<ScopedRoleGrant>>;

    /// Every grant held by `user_id`, regardless of validity window.
    async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<ScopedRoleGrant>>;

    /// Whether the named role carries `permission`.
    async fn role_has_permission(&self, role: &str, permission: &Permission) -> Result<bool>;

    /// Whether `user_id` is recorded as the property's legacy admin-owner.
    async fn is_property_admin_owner(
        &self,
        user_id: UserId,
        property_id: PropertyId,
    ) -> Result<bool>;

    /// Whether `user_id` has an explicit membership row in the organization.
    async fn is_organization_member(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<bool>;

    /// The organization that owns a property.
    async fn organization_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Option<OrganizationId>>;

    /// Owning user and property of a tenant row.
    async fn tenant_record(&self, tenant_id: TenantId) -> Result<Option<TenantRecord>>;

    /// Stored property/tenant ids of a document.
    async fn document_context(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<DocumentContext>>;

    /// Stored tenant id of a payment.
    async fn payment_tenant(&self, payment_id: PaymentId) -> Result<Option<TenantId>>;

    /// Stored tenant id of a maintenance request.
    async fn maintenance_tenant(&self, maintenance_id: MaintenanceId) -> Result<Option<TenantId>>;
}
