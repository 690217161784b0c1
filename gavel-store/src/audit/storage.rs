//! 审计日志存储层
//!
//! Append-only 设计，没有任何删除/更新接口。条目通过 **raw** delegate 写入
//! （绝不经过 TenantGuard 或拦截器），因此审计日志本身不会被再次审计。
//! SHA256 哈希链确保防篡改。

use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;

use super::AUDIT_ENTITY;
use super::types::{
    AuditChainBreak, AuditChainVerification, AuditEntry, AuditQuery, NewAuditEntry,
};
use crate::db::DataDelegate;

/// 存储错误
#[derive(Debug, Error)]
pub enum AuditStorageError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Manual audit writes require an ambient context to stamp the actor.
    #[error("No operation context for manual audit entry")]
    MissingContext,
}

impl From<crate::db::StoreError> for AuditStorageError {
    fn from(err: crate::db::StoreError) -> Self {
        AuditStorageError::Database(err.to_string())
    }
}

pub type AuditStorageResult<T> = Result<T, AuditStorageError>;

impl From<AuditStorageError> for shared::AppError {
    fn from(err: AuditStorageError) -> Self {
        shared::AppError::internal(err.to_string())
    }
}

/// 首条记录的 prev_hash
const GENESIS_HASH: &str = "genesis";

/// (最新序列号, 最新哈希)；序列号 0 表示链为空
type ChainHead = (u64, String);

/// 审计日志存储
///
/// Append-only 设计：
/// - 仅提供 `append` / `query` / `verify_chain`
/// - 没有 delete/update 接口
/// - 链头缓存在 Mutex 中，同时序列化所有 append，防止序列号竞争
pub struct AuditStorage {
    store: Arc<dyn DataDelegate>,
    head: Mutex<Option<ChainHead>>,
}

impl AuditStorage {
    pub fn new(store: Arc<dyn DataDelegate>) -> Self {
        Self {
            store,
            head: Mutex::new(None),
        }
    }

    /// 追加一条审计日志（默认 delegate）
    pub async fn append(&self, entry: NewAuditEntry) -> AuditStorageResult<AuditEntry> {
        self.append_in(self.store.as_ref(), entry).await
    }

    /// 通过调用方提供的 delegate 句柄追加（事务内写入用）
    ///
    /// 1. 读取链头（首次使用时扫描恢复）
    /// 2. 计算新条目的哈希
    /// 3. 写入条目，推进链头
    ///
    /// 事务回滚会让缓存的链头超前于存储（条目从未落库）。每次 append
    /// 先确认链头条目仍然存在，缺失时重新扫描，链自动接回最后一条
    /// 真正持久化的记录。
    pub async fn append_in(
        &self,
        store: &dyn DataDelegate,
        entry: NewAuditEntry,
    ) -> AuditStorageResult<AuditEntry> {
        // 序列化：防止并发 append 导致 sequence 冲突
        let mut head = self.head.lock().await;
        let (last_sequence, last_hash) = match head.clone() {
            Some((seq, hash)) => {
                if seq == 0 || self.head_exists(store, seq).await? {
                    (seq, hash)
                } else {
                    self.recover_head(store).await?
                }
            }
            None => self.recover_head(store).await?,
        };

        let sequence = last_sequence + 1;
        let timestamp = shared::util::now_millis();
        let curr_hash = compute_entry_hash(&last_hash, sequence, timestamp, &entry);

        let record = AuditEntry {
            id: sequence,
            timestamp,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            actor_id: entry.actor_id,
            tenant_id: entry.tenant_id,
            changes: entry.changes,
            metadata: entry.metadata,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            prev_hash: last_hash,
            curr_hash: curr_hash.clone(),
        };

        store
            .create(AUDIT_ENTITY, serde_json::to_value(&record)?)
            .await?;
        *head = Some((sequence, curr_hash));
        Ok(record)
    }

    /// 缓存的链头条目是否仍在库中
    async fn head_exists(
        &self,
        store: &dyn DataDelegate,
        sequence: u64,
    ) -> AuditStorageResult<bool> {
        Ok(store
            .find_unique(AUDIT_ENTITY, serde_json::json!({ "id": sequence }))
            .await?
            .is_some())
    }

    /// 扫描已有条目恢复链头（进程重启、事务回滚后）
    async fn recover_head(&self, store: &dyn DataDelegate) -> AuditStorageResult<ChainHead> {
        let rows = store.find_many(AUDIT_ENTITY, serde_json::json!({})).await?;
        let mut newest: Option<ChainHead> = None;
        for row in rows {
            let entry: AuditEntry = serde_json::from_value(row)?;
            if newest.as_ref().is_none_or(|(seq, _)| entry.id > *seq) {
                newest = Some((entry.id, entry.curr_hash));
            }
        }
        Ok(newest.unwrap_or((0, GENESIS_HASH.to_string())))
    }

    /// 查询审计日志（按序列号倒序，分页）
    pub async fn query(
        &self,
        q: &AuditQuery,
    ) -> AuditStorageResult<(Vec<AuditEntry>, u64)> {
        // 等值条件下推到 delegate，时间范围和分页在内存中处理
        let mut filter = serde_json::Map::new();
        if let Some(ref entity_type) = q.entity_type {
            filter.insert("entity_type".to_string(), entity_type.clone().into());
        }
        if let Some(ref entity_id) = q.entity_id {
            filter.insert("entity_id".to_string(), entity_id.clone().into());
        }
        if let Some(ref actor_id) = q.actor_id {
            filter.insert("actor_id".to_string(), actor_id.clone().into());
        }
        if let Some(ref tenant_id) = q.tenant_id {
            filter.insert("tenant_id".to_string(), tenant_id.clone().into());
        }

        let rows = self
            .store
            .find_many(AUDIT_ENTITY, serde_json::Value::Object(filter))
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry: AuditEntry = serde_json::from_value(row)?;
            if q.from.is_some_and(|from| entry.timestamp < from) {
                continue;
            }
            if q.to.is_some_and(|to| entry.timestamp > to) {
                continue;
            }
            entries.push(entry);
        }

        entries.sort_by(|a, b| b.id.cmp(&a.id));
        let total = entries.len() as u64;
        let page = entries
            .into_iter()
            .skip(q.offset)
            .take(q.limit)
            .collect();
        Ok((page, total))
    }

    /// 验证审计链完整性
    ///
    /// 重算每条记录的哈希并检查与前一条的链接。
    pub async fn verify_chain(&self) -> AuditStorageResult<AuditChainVerification> {
        let rows = self
            .store
            .find_many(AUDIT_ENTITY, serde_json::json!({}))
            .await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(serde_json::from_value::<AuditEntry>(row)?);
        }
        entries.sort_by_key(|e| e.id);

        let mut breaks = Vec::new();
        let mut prev_hash = GENESIS_HASH.to_string();
        for entry in &entries {
            if entry.prev_hash != prev_hash {
                breaks.push(AuditChainBreak {
                    entry_id: entry.id,
                    expected: prev_hash.clone(),
                    actual: entry.prev_hash.clone(),
                });
            }
            let recomputed = compute_entry_hash(
                &entry.prev_hash,
                entry.id,
                entry.timestamp,
                &NewAuditEntry {
                    action: entry.action,
                    entity_type: entry.entity_type.clone(),
                    entity_id: entry.entity_id.clone(),
                    actor_id: entry.actor_id.clone(),
                    tenant_id: entry.tenant_id.clone(),
                    changes: entry.changes.clone(),
                    metadata: entry.metadata.clone(),
                    ip_address: entry.ip_address.clone(),
                    user_agent: entry.user_agent.clone(),
                },
            );
            if recomputed != entry.curr_hash {
                breaks.push(AuditChainBreak {
                    entry_id: entry.id,
                    expected: recomputed,
                    actual: entry.curr_hash.clone(),
                });
            }
            prev_hash = entry.curr_hash.clone();
        }

        Ok(AuditChainVerification {
            total_entries: entries.len() as u64,
            chain_intact: breaks.is_empty(),
            breaks,
        })
    }
}

/// 计算审计条目的 SHA256 哈希
///
/// 所有存储字段参与哈希，任何修改都会导致不匹配。
///
/// 设计要点：
/// - 变长字段间用 `\x00` 分隔，防止 `("ab","cd")` 与 `("abc","d")` 碰撞
/// - 定长字段（u64/i64）用 LE 字节序，无需分隔
/// - Optional 字段用 `\x00`=None / `\x01`+bytes=Some 区分
/// - action 使用 serde 序列化（跨版本稳定），而非 Debug trait
fn compute_entry_hash(
    prev_hash: &str,
    sequence: u64,
    timestamp: i64,
    entry: &NewAuditEntry,
) -> String {
    let mut hasher = Sha256::new();

    // 链接前一条哈希
    hasher.update(prev_hash.as_bytes());
    hasher.update(b"\x00");

    // 定长字段
    hasher.update(sequence.to_le_bytes());
    hasher.update(timestamp.to_le_bytes());

    // action — serde 序列化（与存储格式一致）
    let action_str = serde_json::to_string(&entry.action).unwrap_or_default();
    hasher.update(action_str.as_bytes());
    hasher.update(b"\x00");

    // 变长字符串字段 — 分隔符隔离
    hasher.update(entry.entity_type.as_bytes());
    hasher.update(b"\x00");
    hasher.update(entry.entity_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(entry.actor_id.as_bytes());
    hasher.update(b"\x00");

    // Optional 字段 — tag byte 区分 None/Some
    hash_optional(&mut hasher, entry.tenant_id.as_deref());
    hash_optional(&mut hasher, entry.ip_address.as_deref());
    hash_optional(&mut hasher, entry.user_agent.as_deref());

    // JSON 字段
    hash_optional_json(&mut hasher, entry.changes.as_ref());
    hash_optional_json(&mut hasher, entry.metadata.as_ref());

    format!("{:x}", hasher.finalize())
}

/// Optional 字段哈希：`\x00` = None, `\x01` + bytes + `\x00` = Some
fn hash_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update(b"\x01");
            hasher.update(v.as_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update(b"\x00");
}

fn hash_optional_json(hasher: &mut Sha256, value: Option<&serde_json::Value>) {
    let serialized = value.map(|v| serde_json::to_string(v).unwrap_or_default());
    hash_optional(hasher, serialized.as_deref());
}
