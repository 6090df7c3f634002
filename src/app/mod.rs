// ==========================================
// 农场配额追踪 - 应用层
// ==========================================
// 职责: 装配存储、上下文与 API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
