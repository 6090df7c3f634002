// ==========================================
// 农场配额追踪 - 交付状态判定
// ==========================================
// 成员-材料: 目标为 0 → 不适用; ≥ 目标 → 已达成; ≥ 比例×目标 → 部分; 否则待完成
// 材料合计: 同上, 但不存在"不适用"
// ==========================================

use crate::domain::ledger::DeliveryLedger;
use crate::domain::types::{DeliveryStatus, MemberId};
use crate::engine::quota::Quotas;
use crate::engine::recipe::MaterialTotals;
use serde::{Deserialize, Serialize};

/// 默认"部分完成"阈值 (百分比)
pub const DEFAULT_PARTIAL_RATIO_PCT: u32 = 50;

/// 单个材料的团队进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialProgress {
    pub material: String,
    pub total_required: u64,
    pub total_delivered: u64,
    pub status: DeliveryStatus,
}

/// 单个成员在某材料上的进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMaterialProgress {
    pub material: String,
    pub target: u64,
    pub delivered: u64,
    pub status: DeliveryStatus,
}

// ==========================================
// StatusEvaluator - 状态判定器
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct StatusEvaluator {
    partial_ratio_pct: u32,
}

impl Default for StatusEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PARTIAL_RATIO_PCT)
    }
}

impl StatusEvaluator {
    pub fn new(partial_ratio_pct: u32) -> Self {
        Self { partial_ratio_pct }
    }

    fn reached_partial(&self, target: u64, delivered: u64) -> bool {
        (delivered as u128) * 100 >= (target as u128) * (self.partial_ratio_pct as u128)
    }

    pub fn member_status(&self, target: u64, delivered: u64) -> DeliveryStatus {
        if target == 0 {
            DeliveryStatus::NotApplicable
        } else {
            self.total_status(target, delivered)
        }
    }

    pub fn total_status(&self, target: u64, delivered: u64) -> DeliveryStatus {
        if delivered >= target {
            DeliveryStatus::Reached
        } else if self.reached_partial(target, delivered) {
            DeliveryStatus::Partial
        } else {
            DeliveryStatus::Pending
        }
    }

    /// 各材料团队进度 (对照材料总需求)
    pub fn material_progress(&self, totals: &MaterialTotals, ledger: &DeliveryLedger) -> Vec<MaterialProgress> {
        totals
            .iter()
            .map(|(material, required)| {
                let delivered = ledger.total_for_material(material);
                MaterialProgress {
                    material: material.clone(),
                    total_required: *required,
                    total_delivered: delivered,
                    status: self.total_status(*required, delivered),
                }
            })
            .collect()
    }

    /// 某成员各材料进度 (对照个人配额)
    pub fn member_breakdown(
        &self,
        member: &MemberId,
        quotas: &Quotas,
        ledger: &DeliveryLedger,
    ) -> Vec<MemberMaterialProgress> {
        quotas
            .iter()
            .map(|(material, target)| {
                let delivered = ledger.get(material, member).value();
                MemberMaterialProgress {
                    material: material.clone(),
                    target: *target,
                    delivered,
                    status: self.member_status(*target, delivered),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_member_status_thresholds() {
        let evaluator = StatusEvaluator::default();
        assert_eq!(evaluator.member_status(0, 5), DeliveryStatus::NotApplicable);
        assert_eq!(evaluator.member_status(20, 20), DeliveryStatus::Reached);
        assert_eq!(evaluator.member_status(20, 10), DeliveryStatus::Partial);
        assert_eq!(evaluator.member_status(20, 9), DeliveryStatus::Pending);
        assert_eq!(evaluator.member_status(3, 2), DeliveryStatus::Partial);
    }

    #[test]
    fn test_total_status_has_no_not_applicable() {
        let evaluator = StatusEvaluator::default();
        assert_eq!(evaluator.total_status(0, 0), DeliveryStatus::Reached);
    }

    #[test]
    fn test_custom_partial_ratio() {
        let evaluator = StatusEvaluator::new(75);
        assert_eq!(evaluator.member_status(20, 14), DeliveryStatus::Pending);
        assert_eq!(evaluator.member_status(20, 15), DeliveryStatus::Partial);
    }

    #[test]
    fn test_breakdowns() {
        let a = MemberId::from("a");
        let b = MemberId::from("b");
        let mut ledger = DeliveryLedger::new();
        ledger.reconcile_shape(&BTreeSet::from(["X".to_string()]), &[a.clone(), b.clone()]);
        ledger.set_delivery("X", &a, "20").unwrap();
        ledger.set_delivery("X", &b, "5").unwrap();

        let evaluator = StatusEvaluator::default();
        let totals = MaterialTotals::from([("X".to_string(), 40)]);
        let progress = evaluator.material_progress(&totals, &ledger);
        assert_eq!(progress[0].total_delivered, 25);
        assert_eq!(progress[0].status, DeliveryStatus::Partial);

        let quotas = Quotas::from([("X".to_string(), 20)]);
        let breakdown = evaluator.member_breakdown(&b, &quotas, &ledger);
        assert_eq!(breakdown[0].delivered, 5);
        assert_eq!(breakdown[0].status, DeliveryStatus::Pending);
    }
}
