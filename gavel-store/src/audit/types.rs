//! 审计日志类型定义
//!
//! 所有条目不可变、不可删除，支持 SHA256 哈希链防篡改。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of mutation an entry records. Read operations are never audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

/// 审计日志条目（不可变）
///
/// 每条记录包含 SHA256 哈希链，确保防篡改。
/// - `prev_hash`: 前一条记录的哈希（首条为 "genesis"）
/// - `curr_hash`: 当前记录哈希（包含 prev_hash + 所有字段）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 全局递增序列号（链位置）
    pub id: u64,
    /// 时间戳（Unix 毫秒）
    pub timestamp: i64,
    /// 操作类型
    pub action: AuditAction,
    /// 实体类型（如 "auction", "lot", "bid"）
    pub entity_type: String,
    /// 实体 ID（如 "auction:xxx"）
    pub entity_id: String,
    /// 操作人 ID
    pub actor_id: String,
    /// 所属租户（系统操作为 None）
    pub tenant_id: Option<String>,
    /// 字段级变更集，按 action 取形：
    /// CREATE `{"after": ...}` / DELETE `{"before": ...}` /
    /// UPDATE `{field: {"old": ..., "new": ...}}`
    pub changes: Option<Value>,
    /// 序列化的操作上下文（filter、batch 计数、request id）
    pub metadata: Option<Value>,
    /// 客户端 IP
    pub ip_address: Option<String>,
    /// 客户端 User-Agent
    pub user_agent: Option<String>,
    /// 前一条审计日志哈希
    pub prev_hash: String,
    /// 当前记录哈希（SHA256）
    pub curr_hash: String,
}

/// Input for one entry, before the storage layer stamps sequence, timestamp
/// and hashes.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: String,
    pub tenant_id: Option<String>,
    pub changes: Option<Value>,
    pub metadata: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Caller-supplied payload for the manual (in-transaction) write path.
///
/// Actor and tenant stamping still come from the ambient context; `changes`
/// are taken as-is (no diffing on this path).
#[derive(Debug, Clone)]
pub struct ManualAuditEntry {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub changes: Option<Value>,
    pub metadata: Option<Value>,
}

/// 审计日志查询参数
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    /// 实体类型过滤
    pub entity_type: Option<String>,
    /// 实体 ID 过滤
    pub entity_id: Option<String>,
    /// 操作人过滤
    pub actor_id: Option<String>,
    /// 租户过滤
    pub tenant_id: Option<String>,
    /// 起始时间（Unix 毫秒，含）
    pub from: Option<i64>,
    /// 截止时间（Unix 毫秒，含）
    pub to: Option<i64>,
    /// 分页偏移
    #[serde(default)]
    pub offset: usize,
    /// 分页大小（默认 50）
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            entity_type: None,
            entity_id: None,
            actor_id: None,
            tenant_id: None,
            from: None,
            to: None,
            offset: 0,
            limit: default_limit(),
        }
    }
}

/// 审计日志列表响应
#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub items: Vec<AuditEntry>,
    pub total: u64,
}

/// 审计链验证结果
#[derive(Debug, Serialize)]
pub struct AuditChainVerification {
    /// 验证的记录总数
    pub total_entries: u64,
    /// 链是否完整
    pub chain_intact: bool,
    /// 断裂点列表
    pub breaks: Vec<AuditChainBreak>,
}

/// 审计链断裂点
#[derive(Debug, Serialize)]
pub struct AuditChainBreak {
    /// 断裂处的序列号
    pub entry_id: u64,
    /// 期望的哈希
    pub expected: String,
    /// 实际的哈希
    pub actual: String,
}
