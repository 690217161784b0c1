//! Gavel Data Core - 多租户数据访问拦截层
//!
//! Ambient context propagation, tenant isolation, and audit interception for
//! the Gavel auction platform. Every persisted entity belongs to exactly one
//! tenant; every mutation is attributed to an actor.
//!
//! # Architecture
//!
//! ```text
//! application code
//!   └─ AuditInterceptor   diff + redaction + fire-and-forget persistence
//!        └─ TenantGuard   tenant filter injection + row validation
//!             └─ DataDelegate   opaque persistence engine
//!
//! context::scope(ctx, fut) establishes the ambient OperationContext for
//! one unit of work; both decorators read it back without any parameter
//! threading.
//! ```
//!
//! # Module structure
//!
//! ```text
//! gavel-store/src/
//! ├── core/          # 配置、组合根
//! ├── context/       # OperationContext + task-local scope + middleware
//! ├── db/            # DataDelegate 契约、内存引擎、租户隔离
//! └── audit/         # 审计追踪 (diff、脱敏、哈希链、worker)
//! ```

pub mod audit;
pub mod context;
pub mod core;
pub mod db;

// Re-export 公共类型
pub use audit::{
    AuditAction, AuditConfiguration, AuditEntry, AuditQuery, AuditService, ManualAuditEntry,
};
pub use context::{CurrentActor, OperationContext};
pub use crate::core::{Config, PlatformState};
pub use db::{
    DataDelegate, MemoryStore, StoreError, StoreResult, TenantGuard, TenantPolicies, TenantScope,
};
