//! Cache key construction.
//!
//! Two key families share one namespace prefix:
//!
//! | Family               | Shape                                                  |
//! |----------------------|--------------------------------------------------------|
//! | permission decision  | `{prefix}perm:{actor}:{resource}:{action}:{prop}:{org}` |
//! | property → org       | `{prefix}prop_org:{property}`                          |
//!
//! An unscoped component is written as `-`, so a decision for "no property"
//! never collides with any concrete property id. Resource and action are
//! free-form, so `%` and `:` inside them are percent-encoded to keep the
//! segment boundaries unambiguous.

use std::borrow::Cow;
use std::fmt;

use crate::rbac::models::{Permission, PropertyId, Scope, UserId};

const UNSCOPED: &str = "-";

/// A fully-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for one allow/deny decision.
    pub fn decision(prefix: &str, actor: UserId, permission: &Permission, scope: &Scope) -> Self {
        Self(format!(
            "{}{}:{}:{}:{}",
            Self::actor_prefix(prefix, actor),
            escape_segment(&permission.resource),
            escape_segment(&permission.action),
            scope
                .property_id
                .map_or_else(|| UNSCOPED.to_string(), |id| id.to_string()),
            scope
                .organization_id
                .map_or_else(|| UNSCOPED.to_string(), |id| id.to_string()),
        ))
    }

    /// Key for the organization owning a property.
    pub fn property_organization(prefix: &str, property_id: PropertyId) -> Self {
        Self(format!("{}prop_org:{}", prefix, property_id))
    }

    /// Prefix shared by every decision key of one actor.
    pub fn actor_prefix(prefix: &str, actor: UserId) -> String {
        format!("{}perm:{}:", prefix, actor)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains([':', '%']) {
        return Cow::Borrowed(segment);
    }
    let mut escaped = String::with_capacity(segment.len() + 4);
    for c in segment.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::OrganizationId;

    #[test]
    fn test_decision_key_shape() {
        let perm = Permission::new("tenant", "read");

        let unscoped = CacheKey::decision("gh:", UserId(42), &perm, &Scope::global());
        assert_eq!(unscoped.as_str(), "gh:perm:42:tenant:read:-:-");

        let scoped = CacheKey::decision(
            "gh:",
            UserId(42),
            &perm,
            &Scope::property(PropertyId(5)).with_organization(OrganizationId(2)),
        );
        assert_eq!(scoped.as_str(), "gh:perm:42:tenant:read:5:2");
    }

    #[test]
    fn test_decision_keys_share_actor_prefix() {
        let key = CacheKey::decision(
            "gh:",
            UserId(1),
            &Permission::new("payment", "create"),
            &Scope::organization(OrganizationId(3)),
        );
        assert!(key.as_str().starts_with(&CacheKey::actor_prefix("gh:", UserId(1))));
        assert!(!key.as_str().starts_with(&CacheKey::actor_prefix("gh:", UserId(12))));
        assert!(!CacheKey::decision("gh:", UserId(12), &Permission::new("a", "b"), &Scope::global())
            .as_str()
            .starts_with(&CacheKey::actor_prefix("gh:", UserId(1))));
    }

    #[test]
    fn test_colon_placement_yields_distinct_keys() {
        let scope = Scope::global();
        let split_action = CacheKey::decision("gh:", UserId(3), &Permission::new("report", "export:all"), &scope);
        let split_resource = CacheKey::decision("gh:", UserId(3), &Permission::new("report:export", "all"), &scope);

        assert_ne!(split_action, split_resource);
        assert_eq!(split_action.as_str(), "gh:perm:3:report:export%3Aall:-:-");
        assert_eq!(split_resource.as_str(), "gh:perm:3:report%3Aexport:all:-:-");
    }

    #[test]
    fn test_escape_is_unambiguous() {
        assert_eq!(escape_segment("tenant"), "tenant");
        assert_ne!(escape_segment("a%3Ab"), escape_segment("a:b"));
        assert_eq!(escape_segment("a%3Ab"), "a%253Ab");
    }

    #[test]
    fn test_property_organization_key() {
        assert_eq!(
            CacheKey::property_organization("gatehouse:", PropertyId(9)).as_str(),
            "gatehouse:prop_org:9"
        );
    }
}
