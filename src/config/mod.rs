// ==========================================
// 农场配额追踪 - 配置层
// ==========================================
// 职责: 运行配置加载与覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod farm_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use farm_config::FarmConfig;
