//! Audit policy configuration
//!
//! Controls which entity types are audited and whether auditing is enabled
//! at all. Loaded from the backing store through the raw delegate and cached
//! with a short TTL; a load failure falls back to the built-in defaults and
//! never surfaces to the write path. Administrative updates take effect when
//! the cache expires (or via [`AuditConfigCache::invalidate`]).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::AUDIT_CONFIG_ENTITY;
use crate::db::DataDelegate;

/// Entity types audited when no stored configuration is reachable.
pub const DEFAULT_AUDITED_ENTITIES: &[&str] = &["auction", "lot", "bid", "user"];

/// Default cache TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfiguration {
    /// Master switch.
    pub enabled: bool,
    /// Entity types the interceptor records.
    pub audited_entities: HashSet<String>,
}

impl AuditConfiguration {
    /// Hard-coded fallback covering the core domain entities.
    pub fn fallback() -> Self {
        Self {
            enabled: true,
            audited_entities: DEFAULT_AUDITED_ENTITIES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    pub fn audits(&self, entity: &str) -> bool {
        self.enabled && self.audited_entities.contains(entity)
    }
}

/// Source of the stored configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load(&self) -> anyhow::Result<AuditConfiguration>;
}

/// Reads the `audit_config` singleton row through the raw delegate.
///
/// Goes around the interceptor by construction — configuration lookups are
/// never themselves audited.
pub struct DelegateConfigSource {
    store: Arc<dyn DataDelegate>,
}

impl DelegateConfigSource {
    pub fn new(store: Arc<dyn DataDelegate>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ConfigSource for DelegateConfigSource {
    async fn load(&self) -> anyhow::Result<AuditConfiguration> {
        let row = self
            .store
            .find_unique(AUDIT_CONFIG_ENTITY, serde_json::json!({}))
            .await?;
        match row {
            Some(value) => Ok(serde_json::from_value(value)?),
            // No stored row yet: defaults, not an error
            None => Ok(AuditConfiguration::fallback()),
        }
    }
}

struct CachedConfig {
    loaded_at: Instant,
    config: Arc<AuditConfiguration>,
}

/// TTL cache in front of a [`ConfigSource`].
///
/// Concurrent readers share the cached value; stale reads inside the TTL
/// window are an accepted tradeoff.
pub struct AuditConfigCache {
    source: Arc<dyn ConfigSource>,
    ttl: Duration,
    cached: RwLock<Option<CachedConfig>>,
}

impl AuditConfigCache {
    pub fn new(source: Arc<dyn ConfigSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Current configuration. Never fails: a backing-store failure falls
    /// back to [`AuditConfiguration::fallback`] (and is cached for the TTL,
    /// so a down store is not hammered on every write).
    pub async fn get(&self) -> Arc<AuditConfiguration> {
        {
            let guard = self.cached.read().await;
            if let Some(cached) = guard.as_ref()
                && cached.loaded_at.elapsed() < self.ttl
            {
                return cached.config.clone();
            }
        }

        let config = match self.source.load().await {
            Ok(config) => Arc::new(config),
            Err(e) => {
                tracing::warn!("Audit configuration unavailable, using defaults: {e:#}");
                Arc::new(AuditConfiguration::fallback())
            }
        };

        *self.cached.write().await = Some(CachedConfig {
            loaded_at: Instant::now(),
            config: config.clone(),
        });
        config
    }

    /// Drop the cached value so the next read reloads (administrative
    /// configuration updates).
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ConfigSource for CountingSource {
        async fn load(&self) -> anyhow::Result<AuditConfiguration> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("store down");
            }
            Ok(AuditConfiguration {
                enabled: true,
                audited_entities: ["auction".to_string()].into_iter().collect(),
            })
        }
    }

    fn cache(fail: bool, ttl: Duration) -> (Arc<CountingSource>, AuditConfigCache) {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            fail,
        });
        (source.clone(), AuditConfigCache::new(source, ttl))
    }

    #[tokio::test]
    async fn reads_within_ttl_share_one_load() {
        let (source, cache) = cache(false, Duration::from_secs(60));
        let first = cache.get().await;
        let second = cache.get().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.audited_entities, second.audited_entities);
    }

    #[tokio::test]
    async fn store_failure_falls_back_to_defaults() {
        let (_, cache) = cache(true, Duration::from_secs(60));
        let config = cache.get().await;
        assert!(config.enabled);
        assert!(config.audits("auction"));
        assert!(config.audits("lot"));
        assert!(!config.audits("currency"));
    }

    #[tokio::test]
    async fn invalidate_forces_a_reload() {
        let (source, cache) = cache(false, Duration::from_secs(60));
        cache.get().await;
        cache.invalidate().await;
        cache.get().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_ttl_reloads() {
        let (source, cache) = cache(false, Duration::from_millis(1));
        cache.get().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.get().await;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_configuration_audits_nothing() {
        let config = AuditConfiguration {
            enabled: false,
            audited_entities: ["auction".to_string()].into_iter().collect(),
        };
        assert!(!config.audits("auction"));
    }
}
