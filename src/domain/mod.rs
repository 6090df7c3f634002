// ==========================================
// 农场配额追踪 - 领域模型层
// ==========================================
// 职责: 定义领域实体、值对象与其不变量
// 红线: 不含数据访问逻辑,不含派生计算
// ==========================================

pub mod history;
pub mod ledger;
pub mod production;
pub mod roster;
pub mod types;

// 重导出核心类型
pub use history::{CycleSnapshot, HistoryEntry, MemberStanding};
pub use ledger::{DeliveryLedger, LedgerRow};
pub use production::{ManualGoals, ProductionTargets, RecipeTable};
pub use roster::{Member, Roster};
pub use types::{DeliveryStatus, DomainError, MemberId, OptionalQuantity, QuotaMode, Tier};
