//! 核心模块 — 配置与组合根

pub mod config;
pub mod state;

pub use config::Config;
pub use state::PlatformState;
