// ==========================================
// 农场配额追踪 - 排名计算
// ==========================================
// 输入: Roster + 配额 + 交付台账
// 输出: 按完成度降序的 MemberStanding 列表
// 红线: 同分保持名单顺序 (稳定排序)
//       空名单/全零配额不得报错
// ==========================================

use crate::domain::history::MemberStanding;
use crate::domain::ledger::DeliveryLedger;
use crate::domain::roster::{Member, Roster};
use crate::domain::types::Tier;
use crate::engine::quota::Quotas;
use serde::{Deserialize, Serialize};
use tracing::instrument;

// ==========================================
// TierPolicy - 奖牌阈值策略
// ==========================================
// 标准: 100/80/50; 宽松: 100/75/50
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub top: u32,
    pub second: u32,
    pub third: u32,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl TierPolicy {
    pub fn standard() -> Self {
        Self {
            top: 100,
            second: 80,
            third: 50,
        }
    }

    pub fn lenient() -> Self {
        Self {
            top: 100,
            second: 75,
            third: 50,
        }
    }

    /// 阈值须单调不增
    pub fn is_valid(&self) -> bool {
        self.top >= self.second && self.second >= self.third
    }

    pub fn tier_for(&self, percent: u32) -> Tier {
        if percent >= self.top {
            Tier::Gold
        } else if percent >= self.second {
            Tier::Silver
        } else if percent >= self.third {
            Tier::Bronze
        } else {
            Tier::Unplaced
        }
    }
}

/// 完成度百分比: min(100, round(delivered / target × 100)), target = 0 → 0
pub fn completion_percent(delivered: u64, target: u64) -> u32 {
    if target == 0 {
        return 0;
    }
    let ratio = delivered as f64 / target as f64;
    (ratio * 100.0).round().min(100.0) as u32
}

// ==========================================
// RankingCalculator - 排名计算器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RankingCalculator {
    policy: TierPolicy,
}

impl RankingCalculator {
    pub fn new(policy: TierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// 单个成员的排名条目
    ///
    /// - total_target: 正配额之和
    /// - total_delivered: 配额所涉材料上的交付之和
    pub fn standing_for(
        &self,
        roster_index: usize,
        member: &Member,
        quotas: &Quotas,
        ledger: &DeliveryLedger,
    ) -> MemberStanding {
        let mut total_target = 0u64;
        let mut total_delivered = 0u64;

        for (material, quota) in quotas {
            if *quota > 0 {
                total_target = total_target.saturating_add(*quota);
            }
            total_delivered = total_delivered.saturating_add(ledger.get(material, &member.id).value());
        }

        let percent = completion_percent(total_delivered, total_target);

        MemberStanding {
            member_id: member.id.clone(),
            name: member.name.clone(),
            roster_index,
            total_delivered,
            total_target,
            percent,
            tier: self.policy.tier_for(percent),
        }
    }

    /// 全员排名, 按完成度降序
    #[instrument(skip_all, fields(members = roster.len(), materials = quotas.len()))]
    pub fn rank(&self, roster: &Roster, quotas: &Quotas, ledger: &DeliveryLedger) -> Vec<MemberStanding> {
        let mut standings: Vec<MemberStanding> = roster
            .iter()
            .enumerate()
            .map(|(index, member)| self.standing_for(index, member, quotas, ledger))
            .collect();

        // sort_by 为稳定排序
        standings.sort_by(|a, b| b.percent.cmp(&a.percent));
        standings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn ledger_with(roster: &Roster, material: &str, values: &[&str]) -> DeliveryLedger {
        let mut ledger = DeliveryLedger::new();
        let materials = BTreeSet::from([material.to_string()]);
        ledger.reconcile_shape(&materials, &roster.ids());
        for (member, raw) in roster.iter().zip(values) {
            ledger.set_delivery(material, &member.id, raw).unwrap();
        }
        ledger
    }

    #[test]
    fn test_two_member_example() {
        let roster = Roster::with_names(["Ana", "Bia"]);
        let quotas = Quotas::from([("X".to_string(), 20)]);
        let ledger = ledger_with(&roster, "X", &["20", "15"]);

        let standard = RankingCalculator::default().rank(&roster, &quotas, &ledger);
        assert_eq!(standard[0].name, "Ana");
        assert_eq!(standard[0].percent, 100);
        assert_eq!(standard[0].tier, Tier::Gold);
        assert_eq!(standard[1].percent, 75);
        assert_eq!(standard[1].tier, Tier::Bronze);

        let lenient = RankingCalculator::new(TierPolicy::lenient()).rank(&roster, &quotas, &ledger);
        assert_eq!(lenient[1].tier, Tier::Silver);
    }

    #[test]
    fn test_sorted_descending_with_stable_ties() {
        let roster = Roster::with_names(["A", "B", "C", "D"]);
        let quotas = Quotas::from([("X".to_string(), 10)]);
        let ledger = ledger_with(&roster, "X", &["5", "9", "5", ""]);

        let ranking = RankingCalculator::default().rank(&roster, &quotas, &ledger);
        let names: Vec<&str> = ranking.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "C", "D"]);
        assert!(ranking.windows(2).all(|w| w[0].percent >= w[1].percent));
        assert_eq!(ranking[1].roster_index, 0);
        assert_eq!(ranking[2].roster_index, 2);
    }

    #[test]
    fn test_percent_is_capped() {
        let roster = Roster::with_names(["A"]);
        let quotas = Quotas::from([("X".to_string(), 10)]);
        let ledger = ledger_with(&roster, "X", &["35"]);
        let ranking = RankingCalculator::default().rank(&roster, &quotas, &ledger);
        assert_eq!(ranking[0].percent, 100);
        assert_eq!(ranking[0].total_delivered, 35);
    }

    #[test]
    fn test_empty_roster_and_zero_quotas() {
        let calculator = RankingCalculator::default();
        let empty = Roster::new();
        assert!(calculator.rank(&empty, &Quotas::new(), &DeliveryLedger::new()).is_empty());

        let roster = Roster::with_names(["A", "B"]);
        let zero = Quotas::from([("X".to_string(), 0)]);
        let ranking = calculator.rank(&roster, &zero, &DeliveryLedger::new());
        assert_eq!(ranking.len(), 2);
        assert!(ranking.iter().all(|s| s.percent == 0 && s.tier == Tier::Unplaced));
    }

    #[test]
    fn test_completion_percent_rounding() {
        assert_eq!(completion_percent(0, 0), 0);
        assert_eq!(completion_percent(1, 3), 33);
        assert_eq!(completion_percent(2, 3), 67);
        assert_eq!(completion_percent(399, 400), 100);
    }

    #[test]
    fn test_policy_validation() {
        assert!(TierPolicy::standard().is_valid());
        assert!(!TierPolicy { top: 50, second: 80, third: 10 }.is_valid());
    }
}
