// ==========================================
// 农场配额追踪 - 交付台账领域模型
// ==========================================
// 对齐: delivered 文档 {cycle, materials: {material: {member_id: numericString}}}
// 兼容: 旧版按位置存储 {material: [numericString]}
// ==========================================
// 红线: 每个材料行恰好覆盖当前名单的全部成员
//       名单或材料集合变化后必须调用 reconcile_shape
// ==========================================

use crate::domain::types::{DomainError, MemberId, OptionalQuantity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type LedgerRow = BTreeMap<MemberId, OptionalQuantity>;

fn first_cycle() -> u64 {
    1
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum LedgerWire {
    Keyed {
        #[serde(default = "first_cycle")]
        cycle: u64,
        materials: BTreeMap<String, LedgerRow>,
        // 尚未按名单映射的旧版位置数据, 原样保留直到下一次整形
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        legacy_rows: BTreeMap<String, Vec<OptionalQuantity>>,
    },
    Positional(BTreeMap<String, Vec<OptionalQuantity>>),
}

impl From<LedgerWire> for DeliveryLedger {
    fn from(wire: LedgerWire) -> Self {
        match wire {
            LedgerWire::Keyed {
                cycle,
                materials,
                legacy_rows,
            } => DeliveryLedger {
                cycle,
                rows: materials,
                legacy_rows,
            },
            LedgerWire::Positional(rows) => DeliveryLedger {
                cycle: first_cycle(),
                rows: BTreeMap::new(),
                legacy_rows: rows,
            },
        }
    }
}

impl From<DeliveryLedger> for LedgerWire {
    fn from(ledger: DeliveryLedger) -> Self {
        LedgerWire::Keyed {
            cycle: ledger.cycle,
            materials: ledger.rows,
            legacy_rows: ledger.legacy_rows,
        }
    }
}

// ==========================================
// DeliveryLedger - 交付台账 (材料 × 成员)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LedgerWire", into = "LedgerWire")]
pub struct DeliveryLedger {
    cycle: u64,
    rows: BTreeMap<String, LedgerRow>,
    legacy_rows: BTreeMap<String, Vec<OptionalQuantity>>,
}

impl Default for DeliveryLedger {
    fn default() -> Self {
        Self {
            cycle: first_cycle(),
            rows: BTreeMap::new(),
            legacy_rows: BTreeMap::new(),
        }
    }
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前周期序号 (归档幂等键的来源)
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn materials(&self) -> impl Iterator<Item = &String> {
        self.rows.keys()
    }

    pub fn get(&self, material: &str, member: &MemberId) -> OptionalQuantity {
        self.rows
            .get(material)
            .and_then(|row| row.get(member))
            .copied()
            .unwrap_or_default()
    }

    /// 是否仍有未映射的旧版位置数据
    pub fn has_legacy_rows(&self) -> bool {
        !self.legacy_rows.is_empty()
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 按原始输入登记交付量
    ///
    /// # 返回
    /// - Ok(true): 已写入
    /// - Ok(false): 单元格不存在(材料或成员不在台账中), 不做任何修改
    /// - Err: 输入非法, 保留原值
    pub fn set_delivery(
        &mut self,
        material: &str,
        member: &MemberId,
        raw: &str,
    ) -> Result<bool, DomainError> {
        let quantity = OptionalQuantity::parse(raw)?;
        Ok(self.set_quantity(material, member, quantity))
    }

    /// 写入已校验的数量; 单元格不存在时为 no-op
    pub fn set_quantity(&mut self, material: &str, member: &MemberId, quantity: OptionalQuantity) -> bool {
        match self.rows.get_mut(material).and_then(|row| row.get_mut(member)) {
            Some(cell) => {
                *cell = quantity;
                true
            }
            None => false,
        }
    }

    // ==========================================
    // 整形
    // ==========================================

    /// 按材料集合与名单整形
    ///
    /// - 旧版位置数据按名单顺序映射到成员 id
    /// - 丢弃集合外的材料与名单外的成员
    /// - 新材料/新成员补空白
    ///
    /// 幂等: 名单与材料集合不变时重复调用不产生变化
    ///
    /// # 返回
    /// - true: 台账发生变化
    pub fn reconcile_shape(&mut self, materials: &BTreeSet<String>, roster: &[MemberId]) -> bool {
        let before = self.clone();

        let legacy = std::mem::take(&mut self.legacy_rows);
        for (material, values) in legacy {
            let row = self.rows.entry(material).or_default();
            for (id, value) in roster.iter().zip(values) {
                row.insert(id.clone(), value);
            }
        }

        self.rows.retain(|material, _| materials.contains(material));

        let members: BTreeSet<&MemberId> = roster.iter().collect();
        for material in materials {
            let row = self.rows.entry(material.clone()).or_default();
            row.retain(|id, _| members.contains(id));
            for id in roster {
                row.entry(id.clone()).or_default();
            }
        }

        *self != before
    }

    /// 形状是否已与材料集合/名单一致
    pub fn shape_matches(&self, materials: &BTreeSet<String>, roster: &[MemberId]) -> bool {
        if self.has_legacy_rows() || self.rows.len() != materials.len() {
            return false;
        }
        let members: BTreeSet<&MemberId> = roster.iter().collect();
        materials.iter().all(|material| match self.rows.get(material) {
            Some(row) => row.len() == members.len() && row.keys().all(|id| members.contains(id)),
            None => false,
        })
    }

    /// 周期 closed_cycle 已归档, 进入其下一周期: 全部清空并重建形状
    pub fn reset_for_next_cycle(&mut self, closed_cycle: u64, materials: &BTreeSet<String>, roster: &[MemberId]) {
        self.cycle = closed_cycle.saturating_add(1);
        self.rows.clear();
        self.legacy_rows.clear();
        self.reconcile_shape(materials, roster);
    }

    // ==========================================
    // 汇总
    // ==========================================

    pub fn total_for_material(&self, material: &str) -> u64 {
        self.rows
            .get(material)
            .map(|row| row.values().map(OptionalQuantity::value).fold(0, u64::saturating_add))
            .unwrap_or(0)
    }

    pub fn total_for_member(&self, member: &MemberId) -> u64 {
        self.rows
            .values()
            .filter_map(|row| row.get(member))
            .map(OptionalQuantity::value)
            .fold(0, u64::saturating_add)
    }

    /// 按名单顺序的位置视图
    pub fn row_for(&self, material: &str, roster: &[MemberId]) -> Vec<OptionalQuantity> {
        roster.iter().map(|id| self.get(material, id)).collect()
    }

    /// 所有单元格是否均为空白
    pub fn is_blank(&self) -> bool {
        self.legacy_rows.is_empty()
            && self
                .rows
                .values()
                .all(|row| row.values().all(OptionalQuantity::is_empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(n: usize) -> Vec<MemberId> {
        (0..n).map(|i| MemberId::from(format!("m{}", i).as_str())).collect()
    }

    fn set(materials: &[&str]) -> BTreeSet<String> {
        materials.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_reconcile_extends_and_truncates() {
        let roster = ids(3);
        let mut ledger = DeliveryLedger::new();
        assert!(ledger.reconcile_shape(&set(&["X", "Y"]), &roster));
        assert!(ledger.set_delivery("X", &roster[2], "9").unwrap());

        // 名单缩短: 保留剩余成员的数据
        let shorter = vec![roster[0].clone(), roster[2].clone()];
        ledger.reconcile_shape(&set(&["X"]), &shorter);
        assert_eq!(ledger.row_for("X", &shorter), vec![OptionalQuantity::Empty, OptionalQuantity::Value(9)]);
        assert_eq!(ledger.materials().count(), 1);
        assert!(ledger.shape_matches(&set(&["X"]), &shorter));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let roster = ids(2);
        let materials = set(&["X"]);
        let mut ledger = DeliveryLedger::new();
        ledger.reconcile_shape(&materials, &roster);
        ledger.set_delivery("X", &roster[0], "4").unwrap();
        let snapshot = ledger.clone();

        assert!(!ledger.reconcile_shape(&materials, &roster));
        assert!(!ledger.reconcile_shape(&materials, &roster));
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn test_set_delivery_rejects_invalid_and_keeps_previous() {
        let roster = ids(1);
        let mut ledger = DeliveryLedger::new();
        ledger.reconcile_shape(&set(&["X"]), &roster);
        ledger.set_delivery("X", &roster[0], "12").unwrap();

        assert!(ledger.set_delivery("X", &roster[0], "-3").is_err());
        assert_eq!(ledger.get("X", &roster[0]), OptionalQuantity::Value(12));

        // 未知成员/材料: no-op
        assert!(!ledger.set_delivery("X", &MemberId::from("ghost"), "1").unwrap());
        assert!(!ledger.set_delivery("Z", &roster[0], "1").unwrap());
    }

    #[test]
    fn test_totals_coerce_blank_to_zero() {
        let roster = ids(2);
        let mut ledger = DeliveryLedger::new();
        ledger.reconcile_shape(&set(&["X", "Y"]), &roster);
        ledger.set_delivery("X", &roster[0], "20").unwrap();
        ledger.set_delivery("X", &roster[1], "15").unwrap();
        ledger.set_delivery("Y", &roster[0], "5").unwrap();

        assert_eq!(ledger.total_for_material("X"), 35);
        assert_eq!(ledger.total_for_material("missing"), 0);
        assert_eq!(ledger.total_for_member(&roster[0]), 25);
        assert_eq!(ledger.total_for_member(&roster[1]), 15);
    }

    #[test]
    fn test_totals_saturate_on_huge_quantities() {
        let roster = ids(2);
        let mut ledger = DeliveryLedger::new();
        ledger.reconcile_shape(&set(&["X", "Y"]), &roster);
        ledger.set_delivery("X", &roster[0], "18446744073709551615").unwrap();
        ledger.set_delivery("X", &roster[1], "1").unwrap();
        ledger.set_delivery("Y", &roster[0], "7").unwrap();

        assert_eq!(ledger.total_for_material("X"), u64::MAX);
        assert_eq!(ledger.total_for_member(&roster[0]), u64::MAX);
        assert_eq!(ledger.total_for_member(&roster[1]), 1);
    }

    #[test]
    fn test_legacy_positional_document_maps_by_roster_order() {
        let mut ledger: DeliveryLedger =
            serde_json::from_value(json!({"X": ["20", "15"], "Old": ["1"]})).unwrap();
        assert_eq!(ledger.cycle(), 1);
        assert!(ledger.has_legacy_rows());

        // 未整形前序列化仍保留旧数据
        let wire = serde_json::to_value(&ledger).unwrap();
        assert_eq!(wire["legacy_rows"]["X"], json!(["20", "15"]));

        let roster = vec![MemberId::legacy(0), MemberId::legacy(1)];
        ledger.reconcile_shape(&set(&["X"]), &roster);
        assert!(!ledger.has_legacy_rows());
        assert_eq!(
            ledger.row_for("X", &roster),
            vec![OptionalQuantity::Value(20), OptionalQuantity::Value(15)]
        );
        assert_eq!(ledger.materials().count(), 1);
    }

    #[test]
    fn test_reset_for_next_cycle_blanks_everything() {
        let roster = ids(2);
        let materials = set(&["X"]);
        let mut ledger = DeliveryLedger::new();
        ledger.reconcile_shape(&materials, &roster);
        ledger.set_delivery("X", &roster[1], "7").unwrap();

        ledger.reset_for_next_cycle(ledger.cycle(), &materials, &roster);
        assert_eq!(ledger.cycle(), 2);
        assert!(ledger.is_blank());
        assert!(ledger.shape_matches(&materials, &roster));

        // 归档落在更靠后的序号时, 台账跟随
        ledger.reset_for_next_cycle(5, &materials, &roster);
        assert_eq!(ledger.cycle(), 6);
    }

    #[test]
    fn test_keyed_document_round_trip_shape() {
        let roster = ids(1);
        let mut ledger = DeliveryLedger::new();
        ledger.reconcile_shape(&set(&["X"]), &roster);
        ledger.set_delivery("X", &roster[0], "3").unwrap();

        let wire = serde_json::to_value(&ledger).unwrap();
        assert_eq!(wire, json!({"cycle": 1, "materials": {"X": {"m0": "3"}}}));
    }
}
