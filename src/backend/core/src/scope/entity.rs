//! Ownership context stored on individual records.

use std::sync::Arc;
use tracing::debug;

use super::{AccessContext, ResolvedScope};
use crate::db::AccessStore;
use crate::error::Result;
use crate::rbac::models::{DocumentId, ResourceKind, TenantId};

/// Reads the property/tenant ids a document, payment or maintenance request
/// was filed under.
#[derive(Clone)]
pub struct EntityContextResolver {
    store: Arc<dyn AccessStore>,
}

impl EntityContextResolver {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    /// Fill the still-missing property and tenant ids from a document.
    /// Ids already present are never overwritten.
    pub async fn fill_from_document(
        &self,
        resolved: &mut ResolvedScope,
        document_id: DocumentId,
    ) -> Result<()> {
        if resolved.property_id.is_some() && resolved.tenant_id.is_some() {
            return Ok(());
        }

        let Some(document) = self.store.document_context(document_id).await? else {
            debug!(document_id = %document_id, "Document not found");
            return Ok(());
        };

        resolved.property_id = resolved.property_id.or(document.property_id);
        resolved.tenant_id = resolved.tenant_id.or(document.tenant_id);
        Ok(())
    }

    /// The stored tenant of the payment or maintenance request named in the
    /// context, if the resource is one of those kinds.
    pub async fn entity_tenant(
        &self,
        kind: &ResourceKind,
        context: &AccessContext,
    ) -> Result<Option<TenantId>> {
        match (kind, context.payment_id, context.maintenance_id) {
            (ResourceKind::Payment, Some(payment_id), _) => {
                self.store.payment_tenant(payment_id).await
            }
            (ResourceKind::Maintenance, _, Some(maintenance_id)) => {
                self.store.maintenance_tenant(maintenance_id).await
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryAccessStore;
    use crate::rbac::models::{DocumentContext, MaintenanceId, PaymentId, PropertyId};

    #[tokio::test]
    async fn test_document_fills_only_missing_ids() {
        let store = Arc::new(InMemoryAccessStore::new());
        store.add_document(
            DocumentId(1),
            DocumentContext {
                property_id: Some(PropertyId(5)),
                tenant_id: Some(TenantId(7)),
            },
        );
        let resolver = EntityContextResolver::new(store);

        let mut resolved = ResolvedScope {
            property_id: Some(PropertyId(9)),
            ..ResolvedScope::default()
        };
        resolver
            .fill_from_document(&mut resolved, DocumentId(1))
            .await
            .unwrap();

        assert_eq!(resolved.property_id, Some(PropertyId(9)));
        assert_eq!(resolved.tenant_id, Some(TenantId(7)));
    }

    #[tokio::test]
    async fn test_entity_tenant_matches_resource_kind() {
        let store = Arc::new(InMemoryAccessStore::new());
        store.add_payment(PaymentId(3), TenantId(7));
        store.add_maintenance(MaintenanceId(4), TenantId(8));
        let resolver = EntityContextResolver::new(store.clone());

        let context = AccessContext::new()
            .with_payment(PaymentId(3))
            .with_maintenance(MaintenanceId(4));

        assert_eq!(
            resolver.entity_tenant(&ResourceKind::Payment, &context).await.unwrap(),
            Some(TenantId(7))
        );
        assert_eq!(
            resolver
                .entity_tenant(&ResourceKind::Maintenance, &context)
                .await
                .unwrap(),
            Some(TenantId(8))
        );

        let before = store.query_count();
        assert_eq!(
            resolver.entity_tenant(&ResourceKind::Document, &context).await.unwrap(),
            None
        );
        assert_eq!(store.query_count(), before);
    }
}
