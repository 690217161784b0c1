/// 数据核心配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | AUDIT_BUFFER_SIZE | 256 | 审计 mpsc 通道容量 |
/// | AUDIT_CONFIG_TTL_MS | 30000 | 审计配置缓存 TTL(毫秒) |
/// | AUDIT_SYSTEM_ACTOR | (未设置) | 无上下文写入的记账身份 |
/// | ENABLE_AUDIT_LOG | true | 是否启用审计拦截 |
#[derive(Debug, Clone)]
pub struct Config {
    /// 审计 mpsc 通道容量
    pub audit_buffer_size: usize,
    /// 审计配置缓存 TTL (毫秒)
    pub audit_config_ttl_ms: u64,
    /// 无上下文写入记到谁头上；None 时这类写入不产生审计条目
    pub audit_system_actor: Option<String>,
    /// 是否启用审计拦截
    pub enable_audit_log: bool,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            audit_buffer_size: std::env::var("AUDIT_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
            audit_config_ttl_ms: std::env::var("AUDIT_CONFIG_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30000),
            audit_system_actor: std::env::var("AUDIT_SYSTEM_ACTOR").ok(),
            enable_audit_log: std::env::var("ENABLE_AUDIT_LOG")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audit_buffer_size: 256,
            audit_config_ttl_ms: 30000,
            audit_system_actor: None,
            enable_audit_log: true,
        }
    }
}
