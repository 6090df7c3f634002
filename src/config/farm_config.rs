// ==========================================
// 农场配额追踪 - 运行配置
// ==========================================
// 来源: ConfigManager::load_farm_config (config_kv 表)
// 缺省: 配方表/默认产量/默认名单均为内置标准值
// ==========================================

use crate::domain::production::{ProductionTargets, RecipeTable};
use crate::domain::roster::Roster;
use crate::domain::types::QuotaMode;
use crate::engine::ranking::TierPolicy;
use crate::engine::status::DEFAULT_PARTIAL_RATIO_PCT;
use serde::{Deserialize, Serialize};

/// 默认文档键前缀
pub const DEFAULT_NAMESPACE: &str = "farm";

/// 默认语言
pub const DEFAULT_LOCALE: &str = crate::i18n::FALLBACK_LOCALE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmConfig {
    pub namespace: String,
    pub quota_mode: QuotaMode,
    pub tier_policy: TierPolicy,
    pub partial_ratio_pct: u32,
    pub recipe_table: RecipeTable,
    pub default_production: ProductionTargets,
    pub default_members: Vec<String>,
    pub locale: String,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            quota_mode: QuotaMode::EvenSplit,
            tier_policy: TierPolicy::standard(),
            partial_ratio_pct: DEFAULT_PARTIAL_RATIO_PCT,
            recipe_table: RecipeTable::standard(),
            default_production: ProductionTargets::standard(),
            default_members: Roster::standard().names().into_iter().map(String::from).collect(),
            locale: DEFAULT_LOCALE.to_string(),
        }
    }
}

impl FarmConfig {
    /// 默认名单 (每次调用生成新的成员 id)
    pub fn default_roster(&self) -> Roster {
        Roster::with_names(self.default_members.iter().cloned())
    }
}
