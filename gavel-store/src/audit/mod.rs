//! 审计日志模块 — 防篡改字段级变更追踪
//!
//! # 架构
//!
//! ```text
//! 变更操作 (create/update/delete/update_many/delete_many)
//!   └─ AuditInterceptor
//!        ├─ 主操作优先执行 (TenantGuard → engine)
//!        └─ detached task → AuditService::log() → mpsc → AuditWorker
//!                                                         └─ AuditStorage (audit_entry)
//!
//! SHA256 哈希链: genesis → entry₁ → entry₂ → ... → entryₙ
//! ```
//!
//! # 保证
//!
//! - **Fire-and-forget**: 审计失败永远不会影响主操作的结果或时序
//! - **Append-only**: 无删除/更新接口，SHA256 哈希链 + 链验证 API
//! - **递归保护**: 拦截器永远不审计审计日志本身
//! - **脱敏**: 敏感字段在 diff 之后替换为固定标记

pub mod config;
pub mod diff;
pub mod interceptor;
pub mod redact;
pub mod service;
pub mod storage;
pub mod types;
pub mod worker;

pub use config::{AuditConfigCache, AuditConfiguration, ConfigSource, DelegateConfigSource};
pub use interceptor::AuditInterceptor;
pub use redact::REDACTION_MARKER;
pub use service::AuditService;
pub use storage::{AuditStorage, AuditStorageError};
pub use types::{
    AuditAction, AuditChainBreak, AuditChainVerification, AuditEntry, AuditListResponse,
    AuditQuery, ManualAuditEntry, NewAuditEntry,
};
pub use worker::AuditWorker;

/// Entity type name of the audit trail itself. Never audited (recursion
/// guard) and never tenant-scoped (the tenant is data on the entry).
pub const AUDIT_ENTITY: &str = "audit_entry";

/// Entity type name of the stored audit configuration singleton.
pub const AUDIT_CONFIG_ENTITY: &str = "audit_config";
