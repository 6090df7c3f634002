// ==========================================
// 农场配额追踪 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供命令行与宿主应用调用
// ==========================================

pub mod archive_manager;
pub mod context;
pub mod dashboard_api;
pub mod delivery_api;
pub mod error;
pub mod membership_manager;
pub mod validator;

// 重导出核心类型
pub use archive_manager::{standings_to_csv, ArchiveManager, CloseCycleReport};
pub use context::{ColdStartReport, FarmContext};
pub use dashboard_api::{DashboardApi, LedgerGrid, MemberProgress, TeamOverview};
pub use delivery_api::DeliveryApi;
pub use error::{ApiError, ApiResult, CloseStage};
pub use membership_manager::MembershipManager;
pub use validator::ValidationFailure;
