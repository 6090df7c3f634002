// ==========================================
// 农场配额追踪 - 同步层
// ==========================================
// 职责: 本地状态槽与远端文档的双向同步
// ==========================================

pub mod shared_state;

pub use shared_state::{ColdStartOutcome, PendingWrite, SharedDocument, SharedStateStore, SlotKey};

/// 远端文档名
pub mod documents {
    pub const PRODUCTION: &str = "production";
    pub const MEMBERS: &str = "members";
    pub const DELIVERED: &str = "delivered";
    pub const GOALS: &str = "goals";

    /// 历史集合名
    pub const HISTORY: &str = "history";
}
