// ==========================================
// 农场配额追踪 - 配额分配
// ==========================================
// 均分: quota = ceil(total / N), N = 0 → 空映射
// 手工: goals 文档直接给出每人配额
// 红线: 向上取整 (宁可提前完成, 不可缺口)
// ==========================================

use crate::domain::production::ManualGoals;
use crate::domain::types::QuotaMode;
use crate::engine::recipe::MaterialTotals;
use std::collections::{BTreeMap, BTreeSet};

/// 每人配额 (材料 → 数量)
pub type Quotas = BTreeMap<String, u64>;

// ==========================================
// QuotaAllocator - 均分配额
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaAllocator;

impl QuotaAllocator {
    pub fn new() -> Self {
        Self
    }

    /// 按人数均分, 向上取整
    pub fn allocate(&self, totals: &MaterialTotals, member_count: usize) -> Quotas {
        if member_count == 0 {
            return Quotas::new();
        }
        let n = member_count as u64;
        totals
            .iter()
            .map(|(material, total)| (material.clone(), total.div_ceil(n)))
            .collect()
    }
}

// ==========================================
// 配额依据解析
// ==========================================

/// 按配额模式得到当前生效的配额
pub fn resolve_quotas(
    mode: QuotaMode,
    totals: &MaterialTotals,
    member_count: usize,
    goals: &ManualGoals,
) -> Quotas {
    match mode {
        QuotaMode::EvenSplit => QuotaAllocator::new().allocate(totals, member_count),
        QuotaMode::Manual => {
            if member_count == 0 {
                return Quotas::new();
            }
            goals
                .iter()
                .map(|(material, quantity)| (material.clone(), quantity.value()))
                .collect()
        }
    }
}

/// 台账应覆盖的材料集合
///
/// 均分模式: 配方派生的材料
/// 手工模式: 配方派生材料 ∪ goals 中出现的材料
pub fn ledger_materials(mode: QuotaMode, totals: &MaterialTotals, goals: &ManualGoals) -> BTreeSet<String> {
    let mut materials: BTreeSet<String> = totals.keys().cloned().collect();
    if mode == QuotaMode::Manual {
        materials.extend(goals.iter().map(|(material, _)| material.clone()));
    }
    materials
}

/// 是否存在至少一项正配额
pub fn has_positive_quota(quotas: &Quotas) -> bool {
    quotas.values().any(|q| *q > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::OptionalQuantity;

    #[test]
    fn test_even_split_rounds_up() {
        let totals = MaterialTotals::from([("X".to_string(), 40), ("Y".to_string(), 41)]);
        let quotas = QuotaAllocator::new().allocate(&totals, 2);
        assert_eq!(quotas.get("X"), Some(&20));
        assert_eq!(quotas.get("Y"), Some(&21));
    }

    #[test]
    fn test_zero_members_yields_empty_mapping() {
        let totals = MaterialTotals::from([("X".to_string(), 40)]);
        assert!(QuotaAllocator::new().allocate(&totals, 0).is_empty());
    }

    #[test]
    fn test_ceiling_bounds_hold_across_inputs() {
        let allocator = QuotaAllocator::new();
        for total in [0u64, 1, 7, 40, 99, 100, 1_001, 7_500] {
            for n in 1usize..=9 {
                let totals = MaterialTotals::from([("M".to_string(), total)]);
                let quota = allocator.allocate(&totals, n)["M"];
                let n = n as u64;
                assert!(quota * n >= total, "quota={} n={} total={}", quota, n, total);
                assert!(quota * n < total + n, "quota={} n={} total={}", quota, n, total);
            }
        }
    }

    #[test]
    fn test_manual_mode_uses_goals() {
        let mut goals = ManualGoals::new();
        goals.set("Ferro", OptionalQuantity::Value(30));
        goals.set("Cobre", OptionalQuantity::Empty);
        let totals = MaterialTotals::from([("Ferro".to_string(), 1_000)]);

        let quotas = resolve_quotas(QuotaMode::Manual, &totals, 4, &goals);
        assert_eq!(quotas.get("Ferro"), Some(&30));
        assert_eq!(quotas.get("Cobre"), Some(&0));
        assert!(resolve_quotas(QuotaMode::Manual, &totals, 0, &goals).is_empty());

        let materials = ledger_materials(QuotaMode::Manual, &totals, &goals);
        assert_eq!(materials.len(), 2);
        assert_eq!(ledger_materials(QuotaMode::EvenSplit, &totals, &goals).len(), 1);
    }

    #[test]
    fn test_has_positive_quota() {
        assert!(!has_positive_quota(&Quotas::new()));
        assert!(!has_positive_quota(&Quotas::from([("X".to_string(), 0)])));
        assert!(has_positive_quota(&Quotas::from([("X".to_string(), 1)])));
    }
}
