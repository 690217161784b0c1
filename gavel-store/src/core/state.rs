//! 平台状态 — 数据核心的组合根
//!
//! 按固定顺序把各层装配成一个 [`DataDelegate`] 栈：
//!
//! ```text
//! store()  = AuditInterceptor → TenantGuard → engine
//! engine() = 裸引擎（审计存储、配置加载专用，绕过所有拦截）
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::audit::{
    AuditConfigCache, AuditInterceptor, AuditService, AuditStorage, AuditWorker,
    DelegateConfigSource,
};
use crate::core::Config;
use crate::db::{DataDelegate, TenantGuard, TenantPolicies};

/// 平台状态 — 持有装配好的 delegate 栈和审计服务
pub struct PlatformState {
    config: Config,
    /// 业务代码使用的完整栈
    store: Arc<dyn DataDelegate>,
    /// 裸引擎句柄
    engine: Arc<dyn DataDelegate>,
    audit: Arc<AuditService>,
    worker: JoinHandle<()>,
}

impl PlatformState {
    /// 装配 delegate 栈并启动审计 worker
    ///
    /// `engine` 是持久化引擎（生产环境为 SQL 适配器，测试用
    /// [`crate::db::MemoryStore`]）。
    pub fn initialize(
        config: Config,
        engine: Arc<dyn DataDelegate>,
        policies: TenantPolicies,
    ) -> Self {
        let storage = Arc::new(AuditStorage::new(engine.clone()));
        let (audit, rx) = AuditService::new(storage.clone(), config.audit_buffer_size);
        let worker = tokio::spawn(AuditWorker::new(storage).run(rx));

        let guard: Arc<dyn DataDelegate> = Arc::new(TenantGuard::new(engine.clone(), policies));
        let store: Arc<dyn DataDelegate> = if config.enable_audit_log {
            let cache = Arc::new(AuditConfigCache::new(
                Arc::new(DelegateConfigSource::new(engine.clone())),
                Duration::from_millis(config.audit_config_ttl_ms),
            ));
            let mut interceptor = AuditInterceptor::new(guard, audit.clone(), cache);
            if let Some(actor) = &config.audit_system_actor {
                interceptor = interceptor.with_system_actor(actor.clone());
            }
            Arc::new(interceptor)
        } else {
            guard
        };

        Self {
            config,
            store,
            engine,
            audit,
            worker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 业务代码的数据访问入口（审计 + 租户隔离）
    pub fn store(&self) -> Arc<dyn DataDelegate> {
        self.store.clone()
    }

    /// 裸引擎句柄（绕过拦截，谨慎使用）
    pub fn engine(&self) -> Arc<dyn DataDelegate> {
        self.engine.clone()
    }

    pub fn audit(&self) -> Arc<AuditService> {
        self.audit.clone()
    }

    /// 优雅关闭：释放所有发送端后等待 worker 清空通道
    ///
    /// 调用方必须先 drop 自己持有的 store/audit 克隆，否则通道不会关闭，
    /// 此调用将一直等待。
    pub async fn shutdown(self) {
        let Self {
            store,
            engine,
            audit,
            worker,
            ..
        } = self;
        drop(store);
        drop(engine);
        drop(audit);
        if let Err(e) = worker.await {
            tracing::error!("Audit worker terminated abnormally: {e}");
        }
        tracing::info!("Data core shut down");
    }
}
