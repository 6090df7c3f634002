// ==========================================
// 农场配额追踪 - 引擎层
// ==========================================
// 职责: 派生指标计算 (材料需求、配额、排名、状态)
// 红线: 引擎为纯计算, 不访问存储, 不持有共享状态
// ==========================================

pub mod quota;
pub mod ranking;
pub mod recipe;
pub mod status;

// 重导出核心引擎
pub use quota::{has_positive_quota, ledger_materials, resolve_quotas, QuotaAllocator, Quotas};
pub use ranking::{completion_percent, RankingCalculator, TierPolicy};
pub use recipe::{MaterialTotals, RecipeEngine};
pub use status::{MaterialProgress, MemberMaterialProgress, StatusEvaluator};
