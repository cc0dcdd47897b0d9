//! Scope resolution: turning whatever a request carries into the concrete
//! property, organization and tenant ids a check runs against.
//!
//! Precedence for each id, highest first:
//!
//! 1. the explicit [`AccessContext`] value
//! 2. the ambient [`RequestScope`] injected by middleware
//! 3. the actor's home property (property id only)
//! 4. values stored on the target record (documents, payments, maintenance)
//! 5. the cached property → organization lookup (organization id only)

pub mod entity;

pub use entity::EntityContextResolver;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rbac::models::{
    Actor, DocumentId, MaintenanceId, OrganizationId, PaymentId, PropertyId, ResourceKind, Scope,
    TenantId,
};
use crate::rbac::policy::PermissionEngine;

// ═══════════════════════════════════════════════════════════════════════════════
// Request Scope
// ═══════════════════════════════════════════════════════════════════════════════

/// Ambient defaults derived once per request by the scope injection layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestScope {
    pub active_property_id: Option<PropertyId>,
    pub active_organization_id: Option<OrganizationId>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifiers a caller knows about the record being accessed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    pub property_id: Option<PropertyId>,
    pub organization_id: Option<OrganizationId>,
    pub tenant_id: Option<TenantId>,
    pub document_id: Option<DocumentId>,
    pub payment_id: Option<PaymentId>,
    pub maintenance_id: Option<MaintenanceId>,
    #[serde(skip)]
    pub request_scope: Option<RequestScope>,
}

impl AccessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, property_id: PropertyId) -> Self {
        self.property_id = Some(property_id);
        self
    }

    pub fn with_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_document(mut self, document_id: DocumentId) -> Self {
        self.document_id = Some(document_id);
        self
    }

    pub fn with_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_maintenance(mut self, maintenance_id: MaintenanceId) -> Self {
        self.maintenance_id = Some(maintenance_id);
        self
    }

    pub fn with_request_scope(mut self, scope: RequestScope) -> Self {
        self.request_scope = Some(scope);
        self
    }
}

/// The ids a check ends up running against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedScope {
    pub property_id: Option<PropertyId>,
    pub organization_id: Option<OrganizationId>,
    pub tenant_id: Option<TenantId>,
}

impl ResolvedScope {
    /// The (property, organization) pair used for the permission check.
    pub fn scope(&self) -> Scope {
        Scope {
            property_id: self.property_id,
            organization_id: self.organization_id,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scope Resolver
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ScopeResolver {
    engine: PermissionEngine,
    entities: EntityContextResolver,
}

impl ScopeResolver {
    pub fn new(engine: PermissionEngine) -> Self {
        let entities = EntityContextResolver::new(engine.store().clone());
        Self { engine, entities }
    }

    /// Everything that must be known before the permission check: explicit
    /// and ambient ids, document ownership and the property's organization.
    pub async fn resolve_for_check(
        &self,
        actor: &Actor,
        kind: &ResourceKind,
        context: &AccessContext,
    ) -> Result<ResolvedScope> {
        let ambient = context.request_scope.unwrap_or_default();

        let mut resolved = ResolvedScope {
            property_id: context
                .property_id
                .or(ambient.active_property_id)
                .or(actor.property_id),
            organization_id: context
                .organization_id
                .or(ambient.active_organization_id),
            tenant_id: context.tenant_id,
        };

        if *kind == ResourceKind::Document {
            if let Some(document_id) = context.document_id {
                self.entities
                    .fill_from_document(&mut resolved, document_id)
                    .await?;
            }
        }

        if resolved.organization_id.is_none() {
            if let Some(property_id) = resolved.property_id {
                resolved.organization_id = self.engine.organization_for_property(property_id).await?;
            }
        }

        Ok(resolved)
    }

    /// Lookups that only run once the permission check has passed.
    pub async fn resolve_after_check(
        &self,
        kind: &ResourceKind,
        context: &AccessContext,
        resolved: &mut ResolvedScope,
    ) -> Result<()> {
        if resolved.tenant_id.is_none() {
            resolved.tenant_id = self.entities.entity_tenant(kind, context).await?;
        }
        Ok(())
    }

    /// Ambient defaults for one request. Explicit header values win; the
    /// active property falls back to the actor's home property and the
    /// active organization to that property's organization.
    pub async fn request_scope(
        &self,
        actor: &Actor,
        property_id: Option<PropertyId>,
        organization_id: Option<OrganizationId>,
    ) -> Result<RequestScope> {
        let active_property_id = property_id.or(actor.property_id);
        let active_organization_id = match (organization_id, active_property_id) {
            (Some(org), _) => Some(org),
            (None, Some(property_id)) => self.engine.organization_for_property(property_id).await?,
            (None, None) => None,
        };

        Ok(RequestScope {
            active_property_id,
            active_organization_id,
        })
    }
}
