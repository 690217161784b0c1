//! 审计日志服务
//!
//! `AuditService` 是审计日志的对外入口，提供：
//! - 异步日志写入（通过 mpsc 通道发给后台 worker）
//! - 事务内手工写入（`record_in_txn`，绕过通道直接落库）
//! - 日志查询
//! - 链验证

use std::sync::Arc;

use tokio::sync::mpsc;

use super::storage::{AuditStorage, AuditStorageError, AuditStorageResult};
use super::types::{
    AuditChainVerification, AuditEntry, AuditListResponse, AuditQuery, ManualAuditEntry,
    NewAuditEntry,
};
use crate::audit::redact::redacted;
use crate::context;
use crate::db::DataDelegate;

/// 审计日志服务
///
/// 拦截器通过 `log` 把条目发给后台 worker 异步落库；业务代码需要在同一
/// 事务内写审计时用 `record_in_txn` 直接写入。
pub struct AuditService {
    storage: Arc<AuditStorage>,
    tx: mpsc::Sender<NewAuditEntry>,
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService").finish_non_exhaustive()
    }
}

impl AuditService {
    /// 创建审计服务。返回的 Receiver 交给 [`super::AuditWorker::run`]。
    pub fn new(
        storage: Arc<AuditStorage>,
        buffer_size: usize,
    ) -> (Arc<Self>, mpsc::Receiver<NewAuditEntry>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (Arc::new(Self { storage, tx }), rx)
    }

    /// 异步记录审计日志
    ///
    /// 通过 mpsc 通道发送到后台 worker。通道满时等待（审计日志不允许
    /// 丢失）；调用方都是 detached task，主操作不会因此阻塞。
    pub async fn log(&self, entry: NewAuditEntry) {
        if self.tx.send(entry).await.is_err() {
            tracing::error!("Audit log channel closed — audit entry lost!");
        }
    }

    /// 事务内手工写入
    ///
    /// 通过调用方提供的 delegate 句柄同步落库，与业务写入同生共死。
    /// 操作人/租户/IP/UA 从环境上下文补齐；`changes` 不做 diff，只做
    /// 脱敏后原样存储。
    pub async fn record_in_txn(
        &self,
        store: &dyn DataDelegate,
        entry: ManualAuditEntry,
    ) -> AuditStorageResult<AuditEntry> {
        let ctx = context::current().ok_or(AuditStorageError::MissingContext)?;
        self.storage
            .append_in(
                store,
                NewAuditEntry {
                    action: entry.action,
                    entity_type: entry.entity_type,
                    entity_id: entry.entity_id,
                    actor_id: ctx.actor_id.clone(),
                    tenant_id: ctx.tenant_id.clone(),
                    changes: entry.changes.map(redacted),
                    metadata: entry.metadata.map(redacted),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                },
            )
            .await
    }

    /// 查询审计日志
    pub async fn query(&self, q: &AuditQuery) -> AuditStorageResult<AuditListResponse> {
        let (items, total) = self.storage.query(q).await?;
        Ok(AuditListResponse { items, total })
    }

    /// 验证审计链完整性
    pub async fn verify_chain(&self) -> AuditStorageResult<AuditChainVerification> {
        self.storage.verify_chain().await
    }

    /// 获取存储引用
    pub fn storage(&self) -> &AuditStorage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::REDACTION_MARKER;
    use crate::audit::types::AuditAction;
    use crate::context::OperationContext;
    use crate::db::MemoryStore;
    use serde_json::json;

    fn manual_entry() -> ManualAuditEntry {
        ManualAuditEntry {
            action: AuditAction::Update,
            entity_type: "auction".to_string(),
            entity_id: "auction:1".to_string(),
            changes: Some(json!({"status": {"old": "open", "new": "settled"}})),
            metadata: Some(json!({"reason": "settlement", "api_key": "k-1"})),
        }
    }

    #[tokio::test]
    async fn manual_write_requires_a_context() {
        let engine = Arc::new(MemoryStore::new());
        let storage = Arc::new(AuditStorage::new(engine.clone()));
        let (service, _rx) = AuditService::new(storage, 8);

        let err = service
            .record_in_txn(engine.as_ref(), manual_entry())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditStorageError::MissingContext));
    }

    #[tokio::test]
    async fn manual_write_stamps_actor_from_context() {
        let engine = Arc::new(MemoryStore::new());
        let storage = Arc::new(AuditStorage::new(engine.clone()));
        let (service, _rx) = AuditService::new(storage, 8);

        let ctx = OperationContext::for_actor("user:7")
            .with_tenant("tenant:1")
            .with_ip_address("10.0.0.1");
        let entry = context::scope(ctx, async {
            service
                .record_in_txn(engine.as_ref(), manual_entry())
                .await
        })
        .await
        .unwrap();

        assert_eq!(entry.actor_id, "user:7");
        assert_eq!(entry.tenant_id.as_deref(), Some("tenant:1"));
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));
        // Metadata passes through redaction
        assert_eq!(entry.metadata.unwrap()["api_key"], REDACTION_MARKER);
    }
}
