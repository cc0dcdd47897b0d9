//! In-process [`AccessStore`] backed by `dashmap`.
//!
//! Used by tests and local tooling. Every trait call counts as one query, so
//! callers can assert that a code path never reached the store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::AccessStore;
use crate::error::{ErrorCode, GatehouseError, Result};
use crate::rbac::models::{
    DocumentContext, DocumentId, MaintenanceId, MemberRole, OrganizationId, OrganizationMember,
    PaymentId, Permission, Property, PropertyId, ScopedRoleGrant, TenantId, TenantRecord, UserId,
};
use crate::rbac::roles::CanonicalRole;

#[derive(Default)]
pub struct InMemoryAccessStore {
    grants: DashMap<UserId, Vec<ScopedRoleGrant>>,
    role_permissions: DashMap<String, HashSet<Permission>>,
    properties: DashMap<PropertyId, Property>,
    memberships: DashMap<(UserId, OrganizationId), MemberRole>,
    tenants: DashMap<TenantId, TenantRecord>,
    documents: DashMap<DocumentId, DocumentContext>,
    payments: DashMap<PaymentId, TenantId>,
    maintenance: DashMap<MaintenanceId, TenantId>,
    queries: AtomicU64,
    failing: AtomicBool,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with every canonical role's default permission set.
    pub fn with_default_roles() -> Self {
        let store = Self::new();
        for role in CanonicalRole::all() {
            store
                .role_permissions
                .insert(role.id().to_string(), role.default_permissions());
        }
        store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Seeding
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_grant(&self, grant: ScopedRoleGrant) {
        self.grants.entry(grant.user_id).or_default().push(grant);
    }

    /// Drop every grant held by a user.
    pub fn revoke_grants(&self, user_id: UserId) {
        self.grants.remove(&user_id);
    }

    pub fn add_role_permission(&self, role: &str, permission: Permission) {
        self.role_permissions
            .entry(role.to_string())
            .or_default()
            .insert(permission);
    }

    pub fn remove_role_permission(&self, role: &str, permission: &Permission) {
        if let Some(mut perms) = self.role_permissions.get_mut(role) {
            perms.remove(permission);
        }
    }

    pub fn add_property(&self, property: Property) {
        self.properties.insert(property.id, property);
    }

    pub fn remove_property(&self, property_id: PropertyId) {
        self.properties.remove(&property_id);
    }

    pub fn add_member(&self, member: OrganizationMember) {
        self.memberships
            .insert((member.user_id, member.organization_id), member.role);
    }

    pub fn add_tenant(&self, tenant: TenantRecord) {
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn add_document(&self, document_id: DocumentId, context: DocumentContext) {
        self.documents.insert(document_id, context);
    }

    pub fn add_payment(&self, payment_id: PaymentId, tenant_id: TenantId) {
        self.payments.insert(payment_id, tenant_id);
    }

    pub fn add_maintenance(&self, maintenance_id: MaintenanceId, tenant_id: TenantId) {
        self.maintenance.insert(maintenance_id, tenant_id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Instrumentation
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of trait calls served (or failed) so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    /// While set, every query fails with `DatabaseQueryFailed`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn begin_query(&self, name: &'static str) -> Result<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatehouseError::with_internal(
                ErrorCode::DatabaseQueryFailed,
                "Database query failed",
                format!("injected failure in {}", name),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn grants_with_permission(
        &self,
        user_id: UserId,
        permission: &Permission,
    ) -> Result<Vec<ScopedRoleGrant>> {
        self.begin_query("grants_with_permission")?;

        let Some(grants) = self.grants.get(&user_id) else {
            return Ok(Vec::new());
        };
        Ok(grants
            .iter()
            .filter(|grant| {
                self.role_permissions
                    .get(&grant.role)
                    .map_or(false, |perms| perms.contains(permission))
            })
            .cloned()
            .collect())
    }

    async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<ScopedRoleGrant>> {
        self.begin_query("grants_for_user")?;
        Ok(self
            .grants
            .get(&user_id)
            .map(|grants| grants.clone())
            .unwrap_or_default())
    }

    async fn role_has_permission(&self, role: &str, permission: &Permission) -> Result<bool> {
        self.begin_query("role_has_permission")?;
        Ok(self
            .role_permissions
            .get(role)
            .map_or(false, |perms| perms.contains(permission)))
    }

    async fn is_property_admin_owner(
        &self,
        user_id: UserId,
        property_id: PropertyId,
    ) -> Result<bool> {
        self.begin_query("is_property_admin_owner")?;
        Ok(self
            .properties
            .get(&property_id)
            .map_or(false, |p| p.admin_owner == Some(user_id)))
    }

    async fn is_organization_member(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<bool> {
        self.begin_query("is_organization_member")?;
        Ok(self.memberships.contains_key(&(user_id, organization_id)))
    }

    async fn organization_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Option<OrganizationId>> {
        self.begin_query("organization_for_property")?;
        Ok(self.properties.get(&property_id).map(|p| p.organization_id))
    }

    async fn tenant_record(&self, tenant_id: TenantId) -> Result<Option<TenantRecord>> {
        self.begin_query("tenant_record")?;
        Ok(self.tenants.get(&tenant_id).map(|t| *t))
    }

    async fn document_context(&self, document_id: DocumentId) -> Result<Option<DocumentContext>> {
        self.begin_query("document_context")?;
        Ok(self.documents.get(&document_id).map(|d| *d))
    }

    async fn payment_tenant(&self, payment_id: PaymentId) -> Result<Option<TenantId>> {
        self.begin_query("payment_tenant")?;
        Ok(self.payments.get(&payment_id).map(|t| *t))
    }

    async fn maintenance_tenant(&self, maintenance_id: MaintenanceId) -> Result<Option<TenantId>> {
        self.begin_query("maintenance_tenant")?;
        Ok(self.maintenance.get(&maintenance_id).map(|t| *t))
    }
}
