//! 审计拦截器
//!
//! [`AuditInterceptor`] 装饰在 [`TenantGuard`](crate::db::TenantGuard) 外层，
//! 对每个变更操作生成审计条目。主操作永远优先：先执行（并返回）业务写入，
//! 审计条目在 detached task 中发给 [`AuditService`]，任何审计失败只记日志，
//! 不影响主操作结果。
//!
//! 递归保护：`audit_entry` / `audit_config` 两个实体类型永远不被拦截。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::config::AuditConfigCache;
use super::diff;
use super::redact::redacted;
use super::service::AuditService;
use super::types::{AuditAction, NewAuditEntry};
use super::{AUDIT_CONFIG_ENTITY, AUDIT_ENTITY};
use crate::context;
use crate::db::{DataDelegate, ID_FIELD, StoreResult};

/// 一次变更操作的审计身份戳
///
/// 在主操作执行前从环境上下文采样，detached task 里不再依赖 task-local。
#[derive(Clone)]
struct Stamp {
    actor_id: String,
    tenant_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    request_id: Option<String>,
}

impl Stamp {
    fn from_context(ctx: &context::OperationContext) -> Self {
        Self {
            actor_id: ctx.actor_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            request_id: Some(ctx.request_id.clone()),
        }
    }

    fn system(actor_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            tenant_id: None,
            ip_address: None,
            user_agent: None,
            request_id: None,
        }
    }
}

/// 审计拦截器
pub struct AuditInterceptor {
    inner: Arc<dyn DataDelegate>,
    audit: Arc<AuditService>,
    config: Arc<AuditConfigCache>,
    /// 无上下文写入的记账身份；None 时这类写入不产生审计条目
    system_actor: Option<String>,
}

impl AuditInterceptor {
    pub fn new(
        inner: Arc<dyn DataDelegate>,
        audit: Arc<AuditService>,
        config: Arc<AuditConfigCache>,
    ) -> Self {
        Self {
            inner,
            audit,
            config,
            system_actor: None,
        }
    }

    /// 启用无上下文写入的审计记账（定时任务、迁移脚本等）
    pub fn with_system_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.system_actor = Some(actor_id.into());
        self
    }

    /// 决定本次操作是否产生审计，以及记到谁头上
    async fn stamp_for(&self, entity: &str) -> Option<Stamp> {
        // 审计日志/审计配置自身的写入永远不拦截
        if entity == AUDIT_ENTITY || entity == AUDIT_CONFIG_ENTITY {
            return None;
        }
        if !self.config.get().await.audits(entity) {
            return None;
        }
        if let Some(ctx) = context::current() {
            return Some(Stamp::from_context(&ctx));
        }
        match &self.system_actor {
            Some(actor) => Some(Stamp::system(actor)),
            None => {
                tracing::debug!(entity, "Contextless mutation, audit entry skipped");
                None
            }
        }
    }

    /// 发出一条审计条目（fire-and-forget）
    fn dispatch(
        &self,
        stamp: &Stamp,
        action: AuditAction,
        entity: &str,
        entity_id: String,
        changes: Option<Value>,
        metadata: Option<Value>,
    ) {
        let entry = NewAuditEntry {
            action,
            entity_type: entity.to_string(),
            entity_id,
            actor_id: stamp.actor_id.clone(),
            tenant_id: stamp.tenant_id.clone(),
            changes,
            metadata,
            ip_address: stamp.ip_address.clone(),
            user_agent: stamp.user_agent.clone(),
        };
        let audit = self.audit.clone();
        tokio::spawn(async move {
            audit.log(entry).await;
        });
    }

    /// 变更前快照（单行）：过滤器命中的第一行，与 update 将要变更的行
    /// 是同一租户视角下的同一行。读失败只记日志，退化为空快照。
    ///
    /// 不能用 `find_unique`：它取的是引擎视角的第一个命中，跨租户命中
    /// 被压制成 None 后快照会丢失本租户行的真实先前状态。
    async fn snapshot_first(&self, entity: &str, filter: &Value) -> Value {
        match self.inner.find_many(entity, filter.clone()).await {
            Ok(rows) => rows.into_iter().next().unwrap_or_else(|| json!({})),
            Err(e) => {
                tracing::warn!(entity, "Audit pre-read failed: {e}");
                json!({})
            }
        }
    }

    /// 变更前快照（多行）。读失败只记日志，退化为空集。
    async fn snapshot_many(&self, entity: &str, filter: &Value) -> Vec<Value> {
        match self.inner.find_many(entity, filter.clone()).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(entity, "Audit pre-read failed: {e}");
                Vec::new()
            }
        }
    }

    fn metadata(&self, stamp: &Stamp, filter: Option<&Value>, matched: Option<u64>) -> Value {
        let mut meta = serde_json::Map::new();
        if let Some(request_id) = &stamp.request_id {
            meta.insert("request_id".to_string(), request_id.clone().into());
        }
        if let Some(filter) = filter {
            meta.insert("filter".to_string(), redacted(filter.clone()));
        }
        if let Some(matched) = matched {
            meta.insert("matched".to_string(), matched.into());
        }
        Value::Object(meta)
    }
}

/// 行 ID；引擎保证写入后的行带 id，缺失时退化为占位符
fn entity_id_of(row: &Value) -> String {
    match row.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

#[async_trait]
impl DataDelegate for AuditInterceptor {
    async fn create(&self, entity: &str, data: Value) -> StoreResult<Value> {
        let stamp = self.stamp_for(entity).await;
        let row = self.inner.create(entity, data).await?;
        if let Some(stamp) = stamp {
            self.dispatch(
                &stamp,
                AuditAction::Create,
                entity,
                entity_id_of(&row),
                Some(diff::create_changes(&row)),
                Some(self.metadata(&stamp, None, None)),
            );
        }
        Ok(row)
    }

    async fn update(&self, entity: &str, filter: Value, data: Value) -> StoreResult<Value> {
        let stamp = self.stamp_for(entity).await;
        let before = match &stamp {
            Some(_) => Some(self.snapshot_first(entity, &filter).await),
            None => None,
        };
        let row = self.inner.update(entity, filter.clone(), data.clone()).await?;
        if let Some(stamp) = stamp {
            let before = before.unwrap_or_else(|| json!({}));
            // 空 diff（无实际变更）不产生条目
            if let Some(changes) = diff::update_changes(&before, &data, Some(&row)) {
                self.dispatch(
                    &stamp,
                    AuditAction::Update,
                    entity,
                    entity_id_of(&row),
                    Some(changes),
                    Some(self.metadata(&stamp, Some(&filter), None)),
                );
            }
        }
        Ok(row)
    }

    async fn update_many(&self, entity: &str, filter: Value, data: Value) -> StoreResult<u64> {
        let stamp = self.stamp_for(entity).await;
        let before = match &stamp {
            Some(_) => self.snapshot_many(entity, &filter).await,
            None => Vec::new(),
        };
        let count = self
            .inner
            .update_many(entity, filter.clone(), data.clone())
            .await?;
        if let Some(stamp) = stamp {
            // 每个受影响的行一条独立条目
            for row in &before {
                if let Some(changes) = diff::update_changes(row, &data, None) {
                    self.dispatch(
                        &stamp,
                        AuditAction::Update,
                        entity,
                        entity_id_of(row),
                        Some(changes),
                        Some(self.metadata(&stamp, Some(&filter), Some(count))),
                    );
                }
            }
        }
        Ok(count)
    }

    async fn delete(&self, entity: &str, filter: Value) -> StoreResult<Value> {
        let stamp = self.stamp_for(entity).await;
        let row = self.inner.delete(entity, filter.clone()).await?;
        if let Some(stamp) = stamp {
            self.dispatch(
                &stamp,
                AuditAction::Delete,
                entity,
                entity_id_of(&row),
                Some(diff::delete_changes(&row)),
                Some(self.metadata(&stamp, Some(&filter), None)),
            );
        }
        Ok(row)
    }

    async fn delete_many(&self, entity: &str, filter: Value) -> StoreResult<u64> {
        let stamp = self.stamp_for(entity).await;
        let before = match &stamp {
            Some(_) => self.snapshot_many(entity, &filter).await,
            None => Vec::new(),
        };
        let count = self.inner.delete_many(entity, filter.clone()).await?;
        if let Some(stamp) = stamp {
            for row in &before {
                self.dispatch(
                    &stamp,
                    AuditAction::Delete,
                    entity,
                    entity_id_of(row),
                    Some(diff::delete_changes(row)),
                    Some(self.metadata(&stamp, Some(&filter), Some(count))),
                );
            }
        }
        Ok(count)
    }

    // 读操作不审计，直接透传

    async fn find_unique(&self, entity: &str, filter: Value) -> StoreResult<Option<Value>> {
        self.inner.find_unique(entity, filter).await
    }

    async fn find_many(&self, entity: &str, filter: Value) -> StoreResult<Vec<Value>> {
        self.inner.find_many(entity, filter).await
    }
}
