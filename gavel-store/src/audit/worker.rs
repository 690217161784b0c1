//! 审计日志后台 Worker
//!
//! 从 mpsc 通道消费 NewAuditEntry，通过 AuditStorage 落库。
//! 通道关闭时自动退出。

use std::sync::Arc;

use super::storage::AuditStorage;
use super::types::NewAuditEntry;

/// 审计日志后台 Worker
pub struct AuditWorker {
    storage: Arc<AuditStorage>,
}

impl AuditWorker {
    pub fn new(storage: Arc<AuditStorage>) -> Self {
        Self { storage }
    }

    /// 运行 worker（阻塞直到通道关闭）
    pub async fn run(self, mut rx: tokio::sync::mpsc::Receiver<NewAuditEntry>) {
        tracing::info!("📋 Audit log worker started");

        while let Some(entry) = rx.recv().await {
            match self.storage.append(entry).await {
                Ok(entry) => {
                    tracing::debug!(
                        audit_id = entry.id,
                        action = %entry.action,
                        entity = %entry.entity_type,
                        "Audit entry recorded"
                    );
                }
                Err(e) => {
                    tracing::error!("Failed to write audit entry: {:?}", e);
                }
            }
        }

        tracing::info!("Audit log channel closed, worker stopping");
    }
}
