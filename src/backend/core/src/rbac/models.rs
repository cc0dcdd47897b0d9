//! RBAC data models: identifiers, actors, scoped grants, permissions and the
//! hierarchy records the guards inspect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Authenticated user identifier.
    UserId
);
id_type!(
    /// Property identifier.
    PropertyId
);
id_type!(
    /// Organization identifier.
    OrganizationId
);
id_type!(
    /// Tenant record identifier (not the tenant's user id).
    TenantId
);
id_type!(
    /// Document identifier.
    DocumentId
);
id_type!(
    /// Payment identifier.
    PaymentId
);
id_type!(
    /// Maintenance request identifier.
    MaintenanceId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A permission is an action on a resource type, written `resource:action`
/// (for example `tenant:read` or `payment:create`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// The resource type (e.g., "tenant", "document").
    pub resource: String,
    /// The action (e.g., "read", "update").
    pub action: String,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// The resource kind this permission targets.
    pub fn kind(&self) -> ResourceKind {
        ResourceKind::parse(&self.resource)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// Resource vocabulary that drives context resolution and guard dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Property,
    Organization,
    Team,
    Workflow,
    WorkItem,
    Tenant,
    Payment,
    Maintenance,
    Document,
    Other(String),
}

impl ResourceKind {
    pub fn parse(resource: &str) -> Self {
        match resource {
            "property" => Self::Property,
            "organization" => Self::Organization,
            "team" => Self::Team,
            "workflow" => Self::Workflow,
            "work_item" => Self::WorkItem,
            "tenant" => Self::Tenant,
            "payment" => Self::Payment,
            "maintenance" => Self::Maintenance,
            "document" => Self::Document,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Property => "property",
            Self::Organization => "organization",
            Self::Team => "team",
            Self::Workflow => "workflow",
            Self::WorkItem => "work_item",
            Self::Tenant => "tenant",
            Self::Payment => "payment",
            Self::Maintenance => "maintenance",
            Self::Document => "document",
            Self::Other(s) => s,
        }
    }

    /// Resources whose hierarchy guard is the organization guard.
    pub fn is_organization_scoped(&self) -> bool {
        matches!(
            self,
            Self::Organization | Self::Team | Self::Workflow | Self::WorkItem
        )
    }

    /// Resources whose hierarchy guard is the tenant guard (once a tenant id is known).
    pub fn is_tenant_scoped(&self) -> bool {
        matches!(
            self,
            Self::Tenant | Self::Payment | Self::Maintenance | Self::Document
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scope
// ═══════════════════════════════════════════════════════════════════════════════

/// One component of a grant's own scope.
///
/// `Global` matches any requested value, including an absent one. `Scoped(id)`
/// matches only a request for exactly `id`; it never matches an absent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope<T> {
    Global,
    Scoped(T),
}

impl<T: Copy + PartialEq> GrantScope<T> {
    /// A nullable column maps `NULL` to `Global`.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(id) => Self::Scoped(id),
            None => Self::Global,
        }
    }

    pub fn matches(&self, requested: Option<T>) -> bool {
        match self {
            Self::Global => true,
            Self::Scoped(id) => requested == Some(*id),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    pub fn id(&self) -> Option<T> {
        match self {
            Self::Global => None,
            Self::Scoped(id) => Some(*id),
        }
    }
}

/// The (property, organization) pair a permission check is evaluated under.
/// An unset component means the check itself is unscoped in that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub property_id: Option<PropertyId>,
    pub organization_id: Option<OrganizationId>,
}

impl Scope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn property(property_id: PropertyId) -> Self {
        Self {
            property_id: Some(property_id),
            organization_id: None,
        }
    }

    pub fn organization(organization_id: OrganizationId) -> Self {
        Self {
            property_id: None,
            organization_id: Some(organization_id),
        }
    }

    pub fn with_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scoped Role Grant
// ═══════════════════════════════════════════════════════════════════════════════

/// An actor's time-bounded membership in a named role, optionally restricted
/// to a property and/or organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRoleGrant {
    pub user_id: UserId,
    pub role: String,
    pub property: GrantScope<PropertyId>,
    pub organization: GrantScope<OrganizationId>,
    pub valid_from: DateTime<Utc>,
    /// `None` = open-ended.
    pub valid_until: Option<DateTime<Utc>>,
}

impl ScopedRoleGrant {
    /// A global grant valid from now, with no end.
    pub fn new(user_id: UserId, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
            property: GrantScope::Global,
            organization: GrantScope::Global,
            valid_from: Utc::now(),
            valid_until: None,
        }
    }

    pub fn at_property(mut self, property_id: PropertyId) -> Self {
        self.property = GrantScope::Scoped(property_id);
        self
    }

    pub fn at_organization(mut self, organization_id: OrganizationId) -> Self {
        self.organization = GrantScope::Scoped(organization_id);
        self
    }

    pub fn valid_between(
        mut self,
        valid_from: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    /// Both components unset.
    pub fn is_global(&self) -> bool {
        self.property.is_global() && self.organization.is_global()
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && self.valid_until.map_or(true, |until| now < until)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Each component is checked independently: unset on the grant matches
    /// anything, set must equal the requested component.
    pub fn covers(&self, scope: &Scope) -> bool {
        self.property.matches(scope.property_id)
            && self.organization.matches(scope.organization_id)
    }

    pub fn has_role(&self, roles: &[&str]) -> bool {
        roles.contains(&self.role.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Actor
// ═══════════════════════════════════════════════════════════════════════════════

/// The flat role column that predates scoped grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LegacyRole {
    /// Unscoped super-admin.
    SuperAdmin,
    /// Property admin.
    Admin,
    Tenant,
    /// Any value outside the fixed set; always denied.
    Unrecognized(String),
}

impl LegacyRole {
    pub fn parse(value: &str) -> Self {
        match value {
            "super_admin" => Self::SuperAdmin,
            "admin" => Self::Admin,
            "tenant" => Self::Tenant,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Tenant => "tenant",
            Self::Unrecognized(value) => value,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for LegacyRole {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<LegacyRole> for String {
    fn from(role: LegacyRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for LegacyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated principal making a request. Immutable per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<UserId>,
    #[serde(rename = "role")]
    pub legacy_role: LegacyRole,
    /// Properties owned under the legacy model.
    #[serde(default)]
    pub properties: Vec<PropertyId>,
    /// Home property (tenants) or default working property.
    #[serde(default)]
    pub property_id: Option<PropertyId>,
}

impl Actor {
    pub fn new(id: UserId, legacy_role: LegacyRole) -> Self {
        Self {
            id: Some(id),
            legacy_role,
            properties: Vec::new(),
            property_id: None,
        }
    }

    pub fn super_admin(id: UserId) -> Self {
        Self::new(id, LegacyRole::SuperAdmin)
    }

    pub fn admin(id: UserId, properties: impl IntoIterator<Item = PropertyId>) -> Self {
        Self::new(id, LegacyRole::Admin).with_properties(properties)
    }

    pub fn tenant(id: UserId, home_property: PropertyId) -> Self {
        Self::new(id, LegacyRole::Tenant).with_home_property(home_property)
    }

    pub fn with_properties(mut self, properties: impl IntoIterator<Item = PropertyId>) -> Self {
        self.properties = properties.into_iter().collect();
        self
    }

    pub fn with_home_property(mut self, property_id: PropertyId) -> Self {
        self.property_id = Some(property_id);
        self
    }

    pub fn is_super_admin(&self) -> bool {
        self.legacy_role == LegacyRole::SuperAdmin
    }

    pub fn owns_property(&self, property_id: PropertyId) -> bool {
        self.properties.contains(&property_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Hierarchy Records
// ═══════════════════════════════════════════════════════════════════════════════

/// A property belongs to exactly one organization and has one legacy admin-owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub organization_id: OrganizationId,
    pub admin_owner: Option<UserId>,
}

/// Organization-level membership role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

/// Membership record linking a user to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMember {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: MemberRole,
}

/// The owning user and property of a tenant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub user_id: Option<UserId>,
    pub property_id: Option<PropertyId>,
}

/// Stored ownership context of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    pub property_id: Option<PropertyId>,
    pub tenant_id: Option<TenantId>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_permission_display_and_kind() {
        let perm = Permission::new("tenant", "read");
        assert_eq!(perm.to_string(), "tenant:read");
        assert_eq!(perm.kind(), ResourceKind::Tenant);
    }

    #[test]
    fn test_grant_scope_global_matches_anything() {
        let scope: GrantScope<PropertyId> = GrantScope::Global;
        assert!(scope.matches(None));
        assert!(scope.matches(Some(PropertyId(5))));
    }

    #[test]
    fn test_grant_scope_scoped_matches_only_its_id() {
        let scope = GrantScope::Scoped(PropertyId(5));
        assert!(scope.matches(Some(PropertyId(5))));
        assert!(!scope.matches(Some(PropertyId(6))));
        assert!(!scope.matches(None));
    }

    #[test]
    fn test_grant_scope_from_option() {
        assert_eq!(GrantScope::<OrganizationId>::from_option(None), GrantScope::Global);
        assert_eq!(
            GrantScope::from_option(Some(OrganizationId(3))),
            GrantScope::Scoped(OrganizationId(3))
        );
    }

    #[test]
    fn test_grant_covers_components_independently() {
        let grant = ScopedRoleGrant::new(UserId(1), "property_manager").at_property(PropertyId(5));

        assert!(grant.covers(&Scope::property(PropertyId(5))));
        assert!(grant.covers(&Scope::property(PropertyId(5)).with_organization(OrganizationId(9))));
        assert!(!grant.covers(&Scope::property(PropertyId(6))));
        assert!(!grant.covers(&Scope::organization(OrganizationId(9))));
    }

    #[test]
    fn test_global_grant() {
        let grant = ScopedRoleGrant::new(UserId(1), "auditor");
        assert!(grant.is_global());
        assert!(grant.covers(&Scope::global()));
        assert!(grant.covers(&Scope::property(PropertyId(77)).with_organization(OrganizationId(2))));
    }

    #[test]
    fn test_grant_validity_window() {
        let now = Utc::now();
        let grant = ScopedRoleGrant::new(UserId(1), "tenant")
            .valid_between(now - Duration::days(2), Some(now - Duration::days(1)));
        assert!(!grant.is_active_at(now));

        let future = ScopedRoleGrant::new(UserId(1), "tenant")
            .valid_between(now + Duration::hours(1), None);
        assert!(!future.is_active_at(now));

        let open = ScopedRoleGrant::new(UserId(1), "tenant")
            .valid_between(now - Duration::hours(1), None);
        assert!(open.is_active_at(now));
    }

    #[test]
    fn test_legacy_role_parse() {
        assert_eq!(LegacyRole::parse("super_admin"), LegacyRole::SuperAdmin);
        assert_eq!(LegacyRole::parse("admin"), LegacyRole::Admin);
        assert_eq!(LegacyRole::parse("tenant"), LegacyRole::Tenant);
        let other = LegacyRole::parse("janitor");
        assert!(!other.is_recognized());
        assert_eq!(other.as_str(), "janitor");
    }

    #[test]
    fn test_actor_deserialize() {
        let actor: Actor =
            serde_json::from_str(r#"{"id": 3, "role": "admin", "properties": [5, 6]}"#).unwrap();
        assert_eq!(actor.id, Some(UserId(3)));
        assert_eq!(actor.legacy_role, LegacyRole::Admin);
        assert!(actor.owns_property(PropertyId(6)));
        assert!(!actor.owns_property(PropertyId(9)));
        assert_eq!(actor.property_id, None);
    }

    #[test]
    fn test_resource_kind_dispatch_groups() {
        assert!(ResourceKind::parse("work_item").is_organization_scoped());
        assert!(ResourceKind::parse("team").is_organization_scoped());
        assert!(ResourceKind::parse("maintenance").is_tenant_scoped());
        assert!(!ResourceKind::parse("property").is_tenant_scoped());
        assert_eq!(
            ResourceKind::parse("invoice"),
            ResourceKind::Other("invoice".to_string())
        );
    }
}
