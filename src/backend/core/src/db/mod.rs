//! Database layer for Gatehouse.
//!
//! Reads grants, role permissions and the property/organization/tenant
//! hierarchy from PostgreSQL with sqlx. The engine never writes these rows.

pub mod memory;
pub mod store;

pub use memory::InMemoryAccessStore;
pub use store::AccessStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::instrument;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::rbac::models::{
    DocumentContext, DocumentId, GrantScope, MaintenanceId, OrganizationId, PaymentId,
    Permission, PropertyId, ScopedRoleGrant, TenantId, TenantRecord, UserId,
};

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// An [`AccessStore`] reading through this pool.
    pub fn access_store(&self) -> PgAccessStore {
        PgAccessStore::new(self.pool.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PostgreSQL Access Store
// ═══════════════════════════════════════════════════════════════════════════════

/// [`AccessStore`] over the relational schema.
///
/// A `NULL` scope column on `user_roles` means the grant is unscoped in that
/// dimension; it maps to [`GrantScope::Global`].
#[derive(Clone)]
pub struct PgAccessStore {
    pool: PgPool,
}

impl PgAccessStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessStore for PgAccessStore {
    #[instrument(skip(self), fields(permission = %permission))]
    async fn grants_with_permission(
        &self,
        user_id: UserId,
        permission: &Permission,
    ) -> Result<Vec<ScopedRoleGrant>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT ur.user_id, r.name AS role, ur.property_id, ur.organization_id,
                   ur.valid_from, ur.valid_until
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            JOIN role_permissions rp ON rp.role_id = r.id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = $1 AND p.resource = $2 AND p.action = $3
            "#,
        )
        .bind(user_id.get())
        .bind(&permission.resource)
        .bind(&permission.action)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScopedRoleGrant::from).collect())
    }

    #[instrument(skip(self))]
    async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<ScopedRoleGrant>> {
        let rows = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT ur.user_id, r.name AS role, ur.property_id, ur.organization_id,
                   ur.valid_from, ur.valid_until
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScopedRoleGrant::from).collect())
    }

    #[instrument(skip(self), fields(permission = %permission))]
    async fn role_has_permission(&self, role: &str, permission: &Permission) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM roles r
                JOIN role_permissions rp ON rp.role_id = r.id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE r.name = $1 AND p.resource = $2 AND p.action = $3
            )
            "#,
        )
        .bind(role)
        .bind(&permission.resource)
        .bind(&permission.action)
        .fetch_one(&self.pool)
        .await?;

        Ok(found)
    }

    #[instrument(skip(self))]
    async fn is_property_admin_owner(
        &self,
        user_id: UserId,
        property_id: PropertyId,
    ) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM properties WHERE id = $1 AND admin_id = $2)",
        )
        .bind(property_id.get())
        .bind(user_id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(found)
    }

    #[instrument(skip(self))]
    async fn is_organization_member(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM organization_members
                WHERE organization_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(organization_id.get())
        .bind(user_id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(found)
    }

    #[instrument(skip(self))]
    async fn organization_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Option<OrganizationId>> {
        let org: Option<Option<i64>> =
            sqlx::query_scalar("SELECT organization_id FROM properties WHERE id = $1")
                .bind(property_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(org.flatten().map(OrganizationId))
    }

    #[instrument(skip(self))]
    async fn tenant_record(&self, tenant_id: TenantId) -> Result<Option<TenantRecord>> {
        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, user_id, property_id FROM tenants WHERE id = $1",
        )
        .bind(tenant_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TenantRecord::from))
    }

    #[instrument(skip(self))]
    async fn document_context(&self, document_id: DocumentId) -> Result<Option<DocumentContext>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT property_id, tenant_id FROM documents WHERE id = $1",
        )
        .bind(document_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DocumentContext {
            property_id: r.property_id.map(PropertyId),
            tenant_id: r.tenant_id.map(TenantId),
        }))
    }

    #[instrument(skip(self))]
    async fn payment_tenant(&self, payment_id: PaymentId) -> Result<Option<TenantId>> {
        let tenant: Option<Option<i64>> =
            sqlx::query_scalar("SELECT tenant_id FROM payments WHERE id = $1")
                .bind(payment_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(tenant.flatten().map(TenantId))
    }

    #[instrument(skip(self))]
    async fn maintenance_tenant(&self, maintenance_id: MaintenanceId) -> Result<Option<TenantId>> {
        let tenant: Option<Option<i64>> =
            sqlx::query_scalar("SELECT tenant_id FROM maintenance_requests WHERE id = $1")
                .bind(maintenance_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(tenant.flatten().map(TenantId))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types (for sqlx queries)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub struct GrantRow {
    pub user_id: i64,
    pub role: String,
    pub property_id: Option<i64>,
    pub organization_id: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl From<GrantRow> for ScopedRoleGrant {
    fn from(row: GrantRow) -> Self {
        Self {
            user_id: UserId(row.user_id),
            role: row.role,
            property: GrantScope::from_option(row.property_id.map(PropertyId)),
            organization: GrantScope::from_option(row.organization_id.map(OrganizationId)),
            valid_from: row.valid_from,
            valid_until: row.valid_until,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct TenantRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub property_id: Option<i64>,
}

impl From<TenantRow> for TenantRecord {
    fn from(row: TenantRow) -> Self {
        Self {
            id: TenantId(row.id),
            user_id: row.user_id.map(UserId),
            property_id: row.property_id.map(PropertyId),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRow {
    pub property_id: Option<i64>,
    pub tenant_id: Option<i64>,
}
