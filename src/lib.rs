// ==========================================
// 农场配额追踪 - 核心库
// ==========================================
// 职责: 多客户端共享的产量目标/成员名单/交付台账
// 技术栈: Rust + Tokio + SQLite
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 远端文档存储与本地回退存储
pub mod repository;

// 引擎层 - 派生指标计算
pub mod engine;

// 同步层 - 共享状态槽位
pub mod sync;

// 配置层
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    CycleSnapshot, DeliveryLedger, DeliveryStatus, HistoryEntry, ManualGoals, Member, MemberId,
    MemberStanding, OptionalQuantity, ProductionTargets, QuotaMode, RecipeTable, Roster, Tier,
};

// 引擎
pub use engine::{QuotaAllocator, RankingCalculator, RecipeEngine, StatusEvaluator, TierPolicy};

// 同步
pub use sync::{ColdStartOutcome, SharedStateStore, SlotKey};

// 仓储
pub use repository::{
    FallbackStore, MemoryDocumentStore, RemoteDocumentStore, SqliteDocumentStore,
    SqliteFallbackStore,
};

// API
pub use api::{
    ApiError, ApiResult, ArchiveManager, DashboardApi, DeliveryApi, FarmContext, MembershipManager,
};

// 应用
pub use app::AppState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "农场配额追踪";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
