//! Tenant isolation enforcement
//!
//! [`TenantGuard`] wraps the data delegate and intersects every operation
//! with the tenant of the ambient [`OperationContext`](crate::OperationContext).
//! A cross-tenant fetch-by-identifier is indistinguishable from a fetch of a
//! nonexistent identifier: the mismatch is reported as "not found", never as
//! a distinct error, so the existence of another tenant's rows cannot be
//! probed through error shapes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{DataDelegate, StoreError, StoreResult, TENANT_FIELD, require_object};
use crate::context;

/// How an entity type relates to the tenant boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    /// Tenant-scoped; any operation without a tenant in context fails closed.
    Strict,
    /// Tenant-scoped; reads without a tenant return empty results, writes
    /// still fail closed.
    Relaxed,
    /// Intentionally tenant-less (global lookup tables, the audit trail).
    Exempt,
}

/// Declared per-entity strictness registry.
///
/// Entity types that are not registered fall back to the registry default,
/// which is [`TenantScope::Strict`] — the safe direction for a multi-tenant
/// store. Tenant-less entity types must be declared [`TenantScope::Exempt`]
/// explicitly.
#[derive(Debug, Clone)]
pub struct TenantPolicies {
    scopes: HashMap<String, TenantScope>,
    default_scope: TenantScope,
}

impl Default for TenantPolicies {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantPolicies {
    pub fn new() -> Self {
        Self {
            scopes: HashMap::new(),
            default_scope: TenantScope::Strict,
        }
    }

    /// Declarations for the platform schema.
    pub fn platform_defaults() -> Self {
        Self::new()
            .declare("auction", TenantScope::Strict)
            .declare("lot", TenantScope::Strict)
            .declare("bid", TenantScope::Strict)
            .declare("user", TenantScope::Strict)
            // Global lookup tables shared by every tenant
            .declare("currency", TenantScope::Exempt)
            .declare("country", TenantScope::Exempt)
            // The audit trail carries its tenant as data, not as a boundary
            .declare(crate::audit::AUDIT_ENTITY, TenantScope::Exempt)
            .declare(crate::audit::AUDIT_CONFIG_ENTITY, TenantScope::Exempt)
    }

    pub fn with_default(mut self, scope: TenantScope) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn declare(mut self, entity: impl Into<String>, scope: TenantScope) -> Self {
        self.scopes.insert(entity.into(), scope);
        self
    }

    pub fn scope_of(&self, entity: &str) -> TenantScope {
        self.scopes.get(entity).copied().unwrap_or(self.default_scope)
    }
}

/// Resolved read behavior for one operation.
enum ReadScope {
    /// Exempt entity type; forward untouched.
    Passthrough,
    /// Intersect with this tenant.
    Tenant(String),
    /// Relaxed entity type with no tenant in context; empty result.
    Empty,
}

/// Tenant isolation decorator over a [`DataDelegate`].
pub struct TenantGuard {
    inner: Arc<dyn DataDelegate>,
    policies: TenantPolicies,
}

impl TenantGuard {
    pub fn new(inner: Arc<dyn DataDelegate>, policies: TenantPolicies) -> Self {
        Self { inner, policies }
    }

    fn read_scope(&self, entity: &str) -> StoreResult<ReadScope> {
        match self.policies.scope_of(entity) {
            TenantScope::Exempt => Ok(ReadScope::Passthrough),
            scope => match context::current_tenant() {
                Some(tenant) => Ok(ReadScope::Tenant(tenant)),
                None if scope == TenantScope::Relaxed => Ok(ReadScope::Empty),
                None => Err(StoreError::MissingTenantContext(entity.to_string())),
            },
        }
    }

    /// Tenant required for a write; `None` for exempt entity types.
    fn write_tenant(&self, entity: &str) -> StoreResult<Option<String>> {
        match self.policies.scope_of(entity) {
            TenantScope::Exempt => Ok(None),
            _ => context::current_tenant()
                .map(Some)
                .ok_or_else(|| StoreError::MissingTenantContext(entity.to_string())),
        }
    }

    fn cross_tenant_admin() -> bool {
        context::current().map(|c| c.cross_tenant_admin).unwrap_or(false)
    }

    /// Reject payloads that set or change the tenant field, unless the actor
    /// carries the cross-tenant administrative capability.
    fn check_tenant_payload(
        entity: &str,
        data: &Map<String, Value>,
        tenant: &str,
    ) -> StoreResult<()> {
        if let Some(requested) = data.get(TENANT_FIELD)
            && requested.as_str() != Some(tenant)
            && !Self::cross_tenant_admin()
        {
            return Err(StoreError::TenantFieldProtected(entity.to_string()));
        }
        Ok(())
    }

    fn scoped_filter(filter: Value, tenant: &str) -> StoreResult<Value> {
        let mut map = require_object(filter, "filter")?;
        map.insert(TENANT_FIELD.to_string(), Value::String(tenant.to_string()));
        Ok(Value::Object(map))
    }

    fn row_belongs_to(row: &Value, tenant: &str) -> bool {
        row.get(TENANT_FIELD).and_then(Value::as_str) == Some(tenant)
    }
}

#[async_trait]
impl DataDelegate for TenantGuard {
    async fn create(&self, entity: &str, data: Value) -> StoreResult<Value> {
        let Some(tenant) = self.write_tenant(entity)? else {
            return self.inner.create(entity, data).await;
        };
        let mut data = require_object(data, "data")?;
        Self::check_tenant_payload(entity, &data, &tenant)?;
        // Stamp the owning tenant unless a cross-tenant admin set one
        data.entry(TENANT_FIELD.to_string())
            .or_insert_with(|| Value::String(tenant.clone()));
        self.inner.create(entity, Value::Object(data)).await
    }

    async fn update(&self, entity: &str, filter: Value, data: Value) -> StoreResult<Value> {
        let Some(tenant) = self.write_tenant(entity)? else {
            return self.inner.update(entity, filter, data).await;
        };
        let payload = require_object(data, "data")?;
        Self::check_tenant_payload(entity, &payload, &tenant)?;
        let filter = Self::scoped_filter(filter, &tenant)?;
        self.inner
            .update(entity, filter, Value::Object(payload))
            .await
    }

    async fn update_many(&self, entity: &str, filter: Value, data: Value) -> StoreResult<u64> {
        let Some(tenant) = self.write_tenant(entity)? else {
            return self.inner.update_many(entity, filter, data).await;
        };
        let payload = require_object(data, "data")?;
        Self::check_tenant_payload(entity, &payload, &tenant)?;
        let filter = Self::scoped_filter(filter, &tenant)?;
        self.inner
            .update_many(entity, filter, Value::Object(payload))
            .await
    }

    async fn delete(&self, entity: &str, filter: Value) -> StoreResult<Value> {
        let Some(tenant) = self.write_tenant(entity)? else {
            return self.inner.delete(entity, filter).await;
        };
        let filter = Self::scoped_filter(filter, &tenant)?;
        self.inner.delete(entity, filter).await
    }

    async fn delete_many(&self, entity: &str, filter: Value) -> StoreResult<u64> {
        let Some(tenant) = self.write_tenant(entity)? else {
            return self.inner.delete_many(entity, filter).await;
        };
        let filter = Self::scoped_filter(filter, &tenant)?;
        self.inner.delete_many(entity, filter).await
    }

    async fn find_unique(&self, entity: &str, filter: Value) -> StoreResult<Option<Value>> {
        match self.read_scope(entity)? {
            ReadScope::Passthrough => self.inner.find_unique(entity, filter).await,
            ReadScope::Empty => Ok(None),
            ReadScope::Tenant(tenant) => {
                let found = self.inner.find_unique(entity, filter).await?;
                match found {
                    Some(row) if Self::row_belongs_to(&row, &tenant) => Ok(Some(row)),
                    Some(_) => {
                        // Cross-tenant hit: report "not found", same shape as a
                        // nonexistent identifier
                        tracing::debug!(entity, tenant, "cross-tenant fetch suppressed");
                        Ok(None)
                    }
                    None => Ok(None),
                }
            }
        }
    }

    async fn find_many(&self, entity: &str, filter: Value) -> StoreResult<Vec<Value>> {
        match self.read_scope(entity)? {
            ReadScope::Passthrough => self.inner.find_many(entity, filter).await,
            ReadScope::Empty => Ok(Vec::new()),
            ReadScope::Tenant(tenant) => {
                let filter = Self::scoped_filter(filter, &tenant)?;
                self.inner.find_many(entity, filter).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OperationContext, scope};
    use crate::db::MemoryStore;
    use serde_json::json;

    fn guard() -> TenantGuard {
        TenantGuard::new(
            Arc::new(MemoryStore::new()),
            TenantPolicies::platform_defaults().declare("session", TenantScope::Relaxed),
        )
    }

    fn tenant_ctx(tenant: &str) -> OperationContext {
        OperationContext::for_actor("user:test").with_tenant(tenant)
    }

    #[tokio::test]
    async fn cross_tenant_fetch_reads_as_not_found() {
        let guard = guard();
        let row = scope(
            tenant_ctx("tenant:1"),
            guard.create("auction", json!({"title": "x"})),
        )
        .await
        .unwrap();
        let id = row["id"].clone();

        // Another tenant fetching the row and fetching a nonexistent id must
        // be indistinguishable
        let (hit, miss) = scope(tenant_ctx("tenant:2"), async {
            let hit = guard.find_unique("auction", json!({"id": id})).await.unwrap();
            let miss = guard
                .find_unique("auction", json!({"id": "auction:nope"}))
                .await
                .unwrap();
            (hit, miss)
        })
        .await;
        assert_eq!(hit, None);
        assert_eq!(miss, None);

        // The owner still sees it
        let mine = scope(
            tenant_ctx("tenant:1"),
            guard.find_unique("auction", json!({"title": "x"})),
        )
        .await
        .unwrap();
        assert!(mine.is_some());
    }

    #[tokio::test]
    async fn strict_entity_fails_closed_without_tenant() {
        let guard = guard();
        let err = guard
            .find_many("auction", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingTenantContext(_)));

        let err = scope(
            OperationContext::for_actor("user:no-tenant"),
            guard.create("auction", json!({"title": "x"})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::MissingTenantContext(_)));
    }

    #[tokio::test]
    async fn relaxed_entity_reads_empty_without_tenant() {
        let guard = guard();
        assert_eq!(guard.find_many("session", json!({})).await.unwrap(), Vec::<Value>::new());
        assert_eq!(guard.find_unique("session", json!({})).await.unwrap(), None);

        // Writes still require a tenant
        let err = guard
            .create("session", json!({"user": "u"}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingTenantContext(_)));
    }

    #[tokio::test]
    async fn exempt_entity_passes_through() {
        let guard = guard();
        guard
            .create("currency", json!({"code": "EUR"}))
            .await
            .unwrap();
        let rows = guard.find_many("currency", json!({})).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get(TENANT_FIELD).is_none());
    }

    #[tokio::test]
    async fn create_stamps_owning_tenant() {
        let guard = guard();
        let row = scope(
            tenant_ctx("tenant:1"),
            guard.create("lot", json!({"title": "Vase"})),
        )
        .await
        .unwrap();
        assert_eq!(row[TENANT_FIELD], "tenant:1");
    }

    #[tokio::test]
    async fn tenant_field_write_is_rejected_without_capability() {
        let guard = guard();
        let err = scope(
            tenant_ctx("tenant:1"),
            guard.create("lot", json!({"title": "Vase", "tenant_id": "tenant:2"})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::TenantFieldProtected(_)));

        let row = scope(
            tenant_ctx("tenant:1"),
            guard.create("lot", json!({"title": "Vase"})),
        )
        .await
        .unwrap();
        let err = scope(
            tenant_ctx("tenant:1"),
            guard.update(
                "lot",
                json!({"id": row["id"]}),
                json!({"tenant_id": "tenant:2"}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::TenantFieldProtected(_)));
    }

    #[tokio::test]
    async fn cross_tenant_admin_may_set_tenant_field() {
        let guard = guard();
        let ctx = tenant_ctx("tenant:1").with_cross_tenant_admin(true);
        let row = scope(
            ctx,
            guard.create("lot", json!({"title": "Vase", "tenant_id": "tenant:2"})),
        )
        .await
        .unwrap();
        assert_eq!(row[TENANT_FIELD], "tenant:2");
    }

    #[tokio::test]
    async fn list_and_mutation_filters_are_tenant_scoped() {
        let guard = guard();
        scope(tenant_ctx("tenant:1"), guard.create("bid", json!({"amount": 10})))
            .await
            .unwrap();
        scope(tenant_ctx("tenant:2"), guard.create("bid", json!({"amount": 20})))
            .await
            .unwrap();

        let t1_rows = scope(tenant_ctx("tenant:1"), guard.find_many("bid", json!({})))
            .await
            .unwrap();
        assert_eq!(t1_rows.len(), 1);
        assert_eq!(t1_rows[0]["amount"], 10);

        // A bulk mutation under tenant 2 cannot touch tenant 1's rows
        let affected = scope(
            tenant_ctx("tenant:2"),
            guard.update_many("bid", json!({}), json!({"amount": 0})),
        )
        .await
        .unwrap();
        assert_eq!(affected, 1);
        let t1_rows = scope(tenant_ctx("tenant:1"), guard.find_many("bid", json!({})))
            .await
            .unwrap();
        assert_eq!(t1_rows[0]["amount"], 10);
    }
}
