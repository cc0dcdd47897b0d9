//! Canonical role names and the fixed role sets the hierarchy guards consult.
//!
//! | Role               | Scope        | Description                                   |
//! |--------------------|--------------|-----------------------------------------------|
//! | super_admin        | global       | Everything, everywhere                        |
//! | org_owner          | organization | Owns an organization and all its properties   |
//! | org_admin          | organization | Administers an organization                   |
//! | property_admin     | property     | Administers one property                      |
//! | property_manager   | property     | Day-to-day operation of one property          |
//! | leasing_agent      | property     | Tenant onboarding at one property             |
//! | tenant             | property     | A resident; sees only their own records       |

use std::collections::HashSet;

use super::models::{LegacyRole, Permission};

/// Roles that give an actor admin-level reach over a single property.
pub const PROPERTY_LEVEL_ROLES: &[&str] = &["property_admin", "property_manager", "leasing_agent"];

/// Roles that give an actor admin-level reach over an organization.
pub const ORGANIZATION_ADMIN_ROLES: &[&str] = &["org_owner", "org_admin"];

/// Roles that make an actor "tenant-like" for tenant-record checks.
pub const TENANT_ROLES: &[&str] = &["tenant"];

/// The modern role vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalRole {
    SuperAdmin,
    OrgOwner,
    OrgAdmin,
    PropertyAdmin,
    PropertyManager,
    LeasingAgent,
    Tenant,
}

impl CanonicalRole {
    /// The role name as stored in grants and role-permission rows.
    pub fn id(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::OrgOwner => "org_owner",
            Self::OrgAdmin => "org_admin",
            Self::PropertyAdmin => "property_admin",
            Self::PropertyManager => "property_manager",
            Self::LeasingAgent => "leasing_agent",
            Self::Tenant => "tenant",
        }
    }

    /// Map a legacy flat role to its modern equivalent. Unrecognized legacy
    /// values have none.
    pub fn from_legacy(role: &LegacyRole) -> Option<Self> {
        match role {
            LegacyRole::SuperAdmin => Some(Self::SuperAdmin),
            LegacyRole::Admin => Some(Self::PropertyAdmin),
            LegacyRole::Tenant => Some(Self::Tenant),
            LegacyRole::Unrecognized(_) => None,
        }
    }

    pub fn all() -> Vec<CanonicalRole> {
        vec![
            Self::SuperAdmin,
            Self::OrgOwner,
            Self::OrgAdmin,
            Self::PropertyAdmin,
            Self::PropertyManager,
            Self::LeasingAgent,
            Self::Tenant,
        ]
    }

    /// Seed permission set for this role. Deployments own the real
    /// role-permission table; these defaults bootstrap new stores.
    pub fn default_permissions(&self) -> HashSet<Permission> {
        const ALL_RESOURCES: &[&str] = &[
            "organization", "team", "workflow", "work_item", "property",
            "tenant", "payment", "maintenance", "document",
        ];
        const CRUD: &[&str] = &["create", "read", "update", "delete"];

        match self {
            Self::SuperAdmin | Self::OrgOwner => grid(ALL_RESOURCES, CRUD),
            Self::OrgAdmin => {
                let mut perms = grid(ALL_RESOURCES, CRUD);
                perms.remove(&Permission::new("organization", "delete"));
                perms
            }
            Self::PropertyAdmin => {
                let mut perms = grid(
                    &["property", "tenant", "payment", "maintenance", "document"],
                    CRUD,
                );
                perms.remove(&Permission::new("property", "delete"));
                perms.extend(grid(&["work_item", "workflow"], &["read", "update"]));
                perms
            }
            Self::PropertyManager => {
                let mut perms = grid(&["tenant", "maintenance", "document"], CRUD);
                perms.extend(grid(&["property", "payment"], &["read", "update"]));
                perms.extend(grid(&["work_item"], &["read", "update"]));
                perms
            }
            Self::LeasingAgent => {
                let mut perms = grid(&["tenant", "document"], &["create", "read", "update"]);
                perms.insert(Permission::new("property", "read"));
                perms
            }
            Self::Tenant => {
                let mut perms = grid(&["tenant", "payment", "document"], &["read"]);
                perms.extend(grid(&["maintenance"], &["create", "read"]));
                perms.insert(Permission::new("payment", "create"));
                perms
            }
        }
    }
}

fn grid(resources: &[&str], actions: &[&str]) -> HashSet<Permission> {
    resources
        .iter()
        .flat_map(|r| actions.iter().map(move |a| Permission::new(*r, *a)))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_mapping() {
        assert_eq!(
            CanonicalRole::from_legacy(&LegacyRole::SuperAdmin),
            Some(CanonicalRole::SuperAdmin)
        );
        assert_eq!(
            CanonicalRole::from_legacy(&LegacyRole::Admin).map(|r| r.id()),
            Some("property_admin")
        );
        assert_eq!(
            CanonicalRole::from_legacy(&LegacyRole::Tenant).map(|r| r.id()),
            Some("tenant")
        );
        assert_eq!(
            CanonicalRole::from_legacy(&LegacyRole::Unrecognized("owner".into())),
            None
        );
    }

    #[test]
    fn test_role_sets_are_canonical_names() {
        let ids: HashSet<&str> = CanonicalRole::all().iter().map(|r| r.id()).collect();
        for role in PROPERTY_LEVEL_ROLES
            .iter()
            .chain(ORGANIZATION_ADMIN_ROLES)
            .chain(TENANT_ROLES)
        {
            assert!(ids.contains(role), "{} is not a canonical role", role);
        }
    }

    #[test]
    fn test_tenant_defaults_are_narrow() {
        let perms = CanonicalRole::Tenant.default_permissions();
        assert!(perms.contains(&Permission::new("tenant", "read")));
        assert!(perms.contains(&Permission::new("maintenance", "create")));
        assert!(!perms.contains(&Permission::new("tenant", "delete")));
        assert!(!perms.contains(&Permission::new("property", "update")));
    }

    #[test]
    fn test_org_admin_cannot_delete_organization() {
        let perms = CanonicalRole::OrgAdmin.default_permissions();
        assert!(perms.contains(&Permission::new("property", "delete")));
        assert!(!perms.contains(&Permission::new("organization", "delete")));
        assert!(CanonicalRole::OrgOwner
            .default_permissions()
            .contains(&Permission::new("organization", "delete")));
    }
}
