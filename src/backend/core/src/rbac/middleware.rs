//! Axum scope-injection middleware.
//!
//! Reads the authenticated [`Actor`] (inserted into request extensions by the
//! host's authentication layer) plus the optional `x-property-id` and
//! `x-organization-id` headers, and inserts the derived [`RequestScope`] so
//! handlers can seed [`AccessContext`](crate::scope::AccessContext) with it.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

use super::enforcer::AccessGuard;
use super::models::{Actor, OrganizationId, PropertyId};
use crate::error::{ErrorCode, GatehouseError};
use crate::scope::RequestScope;

pub const PROPERTY_HEADER: &str = "x-property-id";
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

// ═══════════════════════════════════════════════════════════════════════════════
// Request Scope Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// Axum extractor for the injected `RequestScope`.
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestScope>()
            .copied()
            .ok_or_else(|| {
                GatehouseError::with_internal(
                    ErrorCode::InternalError,
                    "An internal error occurred",
                    "RequestScope missing; is ScopeInjectionLayer applied?",
                )
                .into_response()
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer that derives the ambient request scope.
///
/// # Example
///
/// ```rust,ignore
/// use gatehouse_core::rbac::{AccessGuard, ScopeInjectionLayer};
///
/// let app = Router::new()
///     .route("/tenants/:id", get(get_tenant))
///     .layer(ScopeInjectionLayer::new(guard.clone()))
///     .layer(auth_layer);
/// ```
#[derive(Clone)]
pub struct ScopeInjectionLayer {
    guard: Arc<AccessGuard>,
}

impl ScopeInjectionLayer {
    pub fn new(guard: Arc<AccessGuard>) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for ScopeInjectionLayer {
    type Service = ScopeInjectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ScopeInjectionService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ScopeInjectionService<S> {
    inner: S,
    guard: Arc<AccessGuard>,
}

impl<S> Service<Request<Body>> for ScopeInjectionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let guard = self.guard.clone();
        // Take the service that was polled ready and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            // Unauthenticated requests pass through untouched; access checks
            // deny them later.
            let Some(actor) = request.extensions().get::<Actor>().cloned() else {
                return inner.call(request).await;
            };

            let headers = request.headers();
            let property_id = header_id(headers, PROPERTY_HEADER).map(PropertyId);
            let organization_id = header_id(headers, ORGANIZATION_HEADER).map(OrganizationId);

            match guard
                .request_scope(&actor, property_id, organization_id)
                .await
            {
                Ok(scope) => {
                    request.extensions_mut().insert(scope);
                }
                Err(e) => {
                    e.log();
                    return Ok(e.into_response());
                }
            }

            inner.call(request).await
        })
    }
}

/// A numeric id header. Absent or malformed values are ignored.
fn header_id(headers: &HeaderMap, name: &str) -> Option<i64> {
    let value = headers.get(name)?;
    match value.to_str().ok().and_then(|v| v.trim().parse().ok()) {
        Some(id) => Some(id),
        None => {
            warn!(header = name, "Ignoring malformed id header");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
