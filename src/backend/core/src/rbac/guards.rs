//! Hierarchy guards.
//!
//! A permission says an actor's role may touch a resource *type*. The guards
//! check the actor's relationship to one concrete property, organization or
//! tenant record. Every guard returns `Ok(())` or a uniform denial.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::models::{
    Actor, GrantScope, LegacyRole, OrganizationId, PropertyId, ScopedRoleGrant, TenantId,
};
use super::policy::PermissionEngine;
use super::roles::{ORGANIZATION_ADMIN_ROLES, PROPERTY_LEVEL_ROLES, TENANT_ROLES};
use crate::db::AccessStore;
use crate::error::{GatehouseError, Result};
use crate::telemetry::metrics::record_denial;

/// Property, organization and tenant-record guards.
#[derive(Clone)]
pub struct HierarchyGuards {
    engine: PermissionEngine,
    enforce_property_ownership: bool,
}

impl HierarchyGuards {
    pub fn new(engine: PermissionEngine, enforce_property_ownership: bool) -> Self {
        Self {
            engine,
            enforce_property_ownership,
        }
    }

    fn store(&self) -> &Arc<dyn AccessStore> {
        self.engine.store()
    }

    /// Active grants held by the actor; empty for an actor without an id.
    async fn active_grants(&self, actor: &Actor) -> Result<Vec<ScopedRoleGrant>> {
        let Some(user_id) = actor.id else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let mut grants = self.store().grants_for_user(user_id).await?;
        grants.retain(|grant| grant.is_active_at(now));
        Ok(grants)
    }

    /// Whether a property-level grant reaches `property_id`. A grant that is
    /// also pinned to an organization only reaches properties of that
    /// organization.
    async fn property_grant_reaches(
        &self,
        grant: &ScopedRoleGrant,
        property_id: PropertyId,
    ) -> Result<bool> {
        if !grant.has_role(PROPERTY_LEVEL_ROLES) || !grant.property.matches(Some(property_id)) {
            return Ok(false);
        }
        match grant.organization {
            GrantScope::Global => Ok(true),
            GrantScope::Scoped(org) => Ok(self
                .engine
                .organization_for_property(property_id)
                .await?
                == Some(org)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Property
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, actor, property_id), fields(actor = ?actor.id))]
    pub async fn ensure_property_access(
        &self,
        actor: &Actor,
        property_id: impl Into<Option<PropertyId>> + Send,
    ) -> Result<()> {
        let Some(property_id) = property_id.into() else {
            return Err(deny("property", GatehouseError::scope_required("Property")));
        };

        let allowed = match &actor.legacy_role {
            LegacyRole::SuperAdmin => true,
            LegacyRole::Tenant => actor.property_id == Some(property_id),
            LegacyRole::Admin => self.admin_reaches_property(actor, property_id).await?,
            LegacyRole::Unrecognized(_) => false,
        };

        if allowed {
            Ok(())
        } else {
            debug!(property_id = %property_id, "Property access denied");
            Err(deny("property", GatehouseError::access_denied()))
        }
    }

    async fn admin_reaches_property(&self, actor: &Actor, property_id: PropertyId) -> Result<bool> {
        if actor.owns_property(property_id) {
            return Ok(true);
        }
        let Some(user_id) = actor.id else {
            return Ok(false);
        };
        if self.enforce_property_ownership
            && self
                .store()
                .is_property_admin_owner(user_id, property_id)
                .await?
        {
            return Ok(true);
        }
        for grant in self.active_grants(actor).await? {
            if self.property_grant_reaches(&grant, property_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Organization
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, actor, organization_id), fields(actor = ?actor.id))]
    pub async fn ensure_organization_access(
        &self,
        actor: &Actor,
        organization_id: impl Into<Option<OrganizationId>> + Send,
    ) -> Result<()> {
        let Some(organization_id) = organization_id.into() else {
            return Err(deny(
                "organization",
                GatehouseError::scope_required("Organization"),
            ));
        };

        if actor.is_super_admin() || self.reaches_organization(actor, organization_id).await? {
            Ok(())
        } else {
            debug!(organization_id = %organization_id, "Organization access denied");
            Err(deny("organization", GatehouseError::access_denied()))
        }
    }

    async fn reaches_organization(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
    ) -> Result<bool> {
        let admin_grant = self.active_grants(actor).await?.iter().any(|grant| {
            grant.has_role(ORGANIZATION_ADMIN_ROLES)
                && grant.organization.matches(Some(organization_id))
        });
        if admin_grant {
            return Ok(true);
        }

        if let Some(user_id) = actor.id {
            if self
                .store()
                .is_organization_member(user_id, organization_id)
                .await?
            {
                return Ok(true);
            }
        }

        let candidates: Vec<PropertyId> = match actor.legacy_role {
            LegacyRole::Admin => actor.properties.clone(),
            LegacyRole::Tenant => actor.property_id.into_iter().collect(),
            _ => Vec::new(),
        };
        for property_id in candidates {
            if self.engine.organization_for_property(property_id).await? == Some(organization_id) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tenant record
    // ─────────────────────────────────────────────────────────────────────────

    /// Tenant-like actors reach only their own tenant row; admin-like actors
    /// reach any tenant row of a property they can access.
    #[instrument(skip(self, actor, tenant_id), fields(actor = ?actor.id))]
    pub async fn ensure_tenant_access(
        &self,
        actor: &Actor,
        tenant_id: impl Into<Option<TenantId>> + Send,
    ) -> Result<()> {
        let Some(tenant_id) = tenant_id.into() else {
            return Err(deny("tenant", GatehouseError::scope_required("Tenant")));
        };

        if actor.is_super_admin() {
            return Ok(());
        }

        // A nonexistent row is indistinguishable from a forbidden one.
        let Some(record) = self.store().tenant_record(tenant_id).await? else {
            debug!(tenant_id = %tenant_id, "Tenant record not found");
            return Err(deny("tenant", GatehouseError::access_denied()));
        };

        let grants = self.active_grants(actor).await?;
        let holds_at_tenant_property = |roles: &[&str]| {
            grants
                .iter()
                .any(|g| g.has_role(roles) && g.property.matches(record.property_id))
        };

        let tenant_like =
            actor.legacy_role == LegacyRole::Tenant || holds_at_tenant_property(TENANT_ROLES);
        if tenant_like {
            return match (actor.id, record.user_id) {
                (Some(own), Some(owner)) if own == owner => Ok(()),
                _ => {
                    debug!(tenant_id = %tenant_id, "Tenant record belongs to another user");
                    Err(deny("tenant", GatehouseError::access_denied()))
                }
            };
        }

        let admin_like = actor.legacy_role == LegacyRole::Admin
            || holds_at_tenant_property(PROPERTY_LEVEL_ROLES);
        if admin_like {
            if let Some(property_id) = record.property_id {
                return self.ensure_property_access(actor, property_id).await;
            }
        }

        Err(deny("tenant", GatehouseError::access_denied()))
    }
}

fn deny(guard: &'static str, error: GatehouseError) -> GatehouseError {
    record_denial(guard);
    error
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
