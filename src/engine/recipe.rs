// ==========================================
// 农场配额追踪 - 配方引擎
// ==========================================
// 输入: ProductionTargets + 配方表
// 输出: MaterialTotals = Σ(数量 × 单位用量)
// 红线: 纯函数, 无隐藏状态; 空白数量按 0 计
// ==========================================

use crate::domain::production::{ProductionTargets, RecipeTable};
use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

/// 材料总需求 (派生值, 从不持久化)
pub type MaterialTotals = BTreeMap<String, u64>;

// ==========================================
// RecipeEngine - 配方引擎
// ==========================================
#[derive(Debug, Clone)]
pub struct RecipeEngine {
    table: RecipeTable,
}

impl Default for RecipeEngine {
    fn default() -> Self {
        Self::new(RecipeTable::standard())
    }
}

impl RecipeEngine {
    pub fn new(table: RecipeTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RecipeTable {
        &self.table
    }

    /// 计算材料总需求
    ///
    /// # 规则
    /// - 数量为 0 或空白的产品不贡献任何材料
    /// - 配方表中不存在的产品被忽略
    #[instrument(skip_all, fields(products = targets.values.len()))]
    pub fn material_totals(&self, targets: &ProductionTargets) -> MaterialTotals {
        let mut totals = MaterialTotals::new();

        for (product, quantity) in targets.iter() {
            let qty = quantity.value();
            if qty == 0 {
                continue;
            }
            let Some(recipe) = self.table.materials_for(product) else {
                continue;
            };
            for (material, per_unit) in recipe {
                let entry = totals.entry(material.clone()).or_insert(0);
                *entry = entry.saturating_add(qty.saturating_mul(*per_unit));
            }
        }

        totals
    }

    /// 当前目标涉及的材料集合
    pub fn material_set(&self, targets: &ProductionTargets) -> BTreeSet<String> {
        self.material_totals(targets).into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::OptionalQuantity;

    fn single_recipe_engine() -> RecipeEngine {
        let mut table = BTreeMap::new();
        table.insert("A".to_string(), BTreeMap::from([("X".to_string(), 10)]));
        table.insert(
            "B".to_string(),
            BTreeMap::from([("X".to_string(), 1), ("Y".to_string(), 2)]),
        );
        RecipeEngine::new(RecipeTable::new(table))
    }

    #[test]
    fn test_simple_totals() {
        let engine = single_recipe_engine();
        let totals = engine.material_totals(&ProductionTargets::from([("A", 4)]));
        assert_eq!(totals, BTreeMap::from([("X".to_string(), 40)]));
    }

    #[test]
    fn test_shared_materials_accumulate() {
        let engine = single_recipe_engine();
        let totals = engine.material_totals(&ProductionTargets::from([("A", 2), ("B", 3)]));
        assert_eq!(totals.get("X"), Some(&23));
        assert_eq!(totals.get("Y"), Some(&6));
    }

    #[test]
    fn test_zero_blank_and_unknown_products_contribute_nothing() {
        let engine = single_recipe_engine();
        let mut targets = ProductionTargets::from([("A", 0), ("Unknown", 9)]);
        targets.set("B", OptionalQuantity::Empty);
        assert!(engine.material_totals(&targets).is_empty());
    }

    #[test]
    fn test_materials_equal_union_of_nonzero_recipes() {
        let engine = RecipeEngine::default();
        let targets = ProductionTargets::from([("Capuz", 1), ("Flipper MK3", 0)]);
        let materials = engine.material_set(&targets);
        let expected: BTreeSet<String> = ["Borracha", "Plástico", "Tecido"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(materials, expected);
    }

    #[test]
    fn test_standard_targets() {
        let engine = RecipeEngine::default();
        let totals = engine.material_totals(&ProductionTargets::standard());
        // Colete 200×20 + Algema 100×30 + Flipper 20×25
        assert_eq!(totals.get("Ferro"), Some(&7_500));
        assert_eq!(totals.get("Titânio"), Some(&20));
        assert_eq!(totals.get("Tecido"), Some(&250));
    }
}
