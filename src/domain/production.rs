// ==========================================
// 农场配额追踪 - 生产目标与配方领域模型
// ==========================================
// 对齐: production 文档 {values: {product: numericString}}
// 对齐: goals 文档 {material: numericString}
// ==========================================

use crate::domain::types::OptionalQuantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ProductionTargets - 生产目标
// ==========================================
// 任何成员都可修改, 条目只改不删
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductionTargets {
    #[serde(default)]
    pub values: BTreeMap<String, OptionalQuantity>,
}

impl ProductionTargets {
    pub fn new() -> Self {
        Self::default()
    }

    /// 系统默认目标
    pub fn standard() -> Self {
        let mut targets = Self::new();
        targets.set("Colete", OptionalQuantity::Value(200));
        targets.set("Algema", OptionalQuantity::Value(100));
        targets.set("Capuz", OptionalQuantity::Value(50));
        targets.set("Flipper MK3", OptionalQuantity::Value(20));
        targets
    }

    pub fn get(&self, product: &str) -> OptionalQuantity {
        self.values.get(product).copied().unwrap_or_default()
    }

    pub fn set(&mut self, product: &str, quantity: OptionalQuantity) {
        self.values.insert(product.to_string(), quantity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionalQuantity)> {
        self.values.iter()
    }
}

impl<const N: usize> From<[(&str, u64); N]> for ProductionTargets {
    fn from(entries: [(&str, u64); N]) -> Self {
        let mut targets = Self::new();
        for (product, qty) in entries {
            targets.set(product, OptionalQuantity::Value(qty));
        }
        targets
    }
}

// ==========================================
// RecipeTable - 配方表
// ==========================================
// product → {material → 单位用量}
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeTable(BTreeMap<String, BTreeMap<String, u64>>);

impl RecipeTable {
    pub fn new(recipes: BTreeMap<String, BTreeMap<String, u64>>) -> Self {
        RecipeTable(recipes)
    }

    /// 内置配方表
    pub fn standard() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            "Colete".to_string(),
            recipe(&[
                ("Borracha", 10),
                ("Plástico", 10),
                ("Alumínio", 20),
                ("Ferro", 20),
                ("Tecido", 1),
            ]),
        );
        table.insert(
            "Algema".to_string(),
            recipe(&[
                ("Borracha", 20),
                ("Plástico", 20),
                ("Alumínio", 25),
                ("Cobre", 25),
                ("Ferro", 30),
            ]),
        );
        table.insert(
            "Capuz".to_string(),
            recipe(&[("Borracha", 10), ("Plástico", 10), ("Tecido", 1)]),
        );
        table.insert(
            "Flipper MK3".to_string(),
            recipe(&[
                ("Alumínio", 25),
                ("Ferro", 25),
                ("Cobre", 25),
                ("Emb. Plástica", 25),
                ("Titânio", 1),
            ]),
        );
        RecipeTable(table)
    }

    pub fn contains_product(&self, product: &str) -> bool {
        self.0.contains_key(product)
    }

    pub fn materials_for(&self, product: &str) -> Option<&BTreeMap<String, u64>> {
        self.0.get(product)
    }

    pub fn products(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn recipe(entries: &[(&str, u64)]) -> BTreeMap<String, u64> {
    entries
        .iter()
        .map(|(material, per_unit)| (material.to_string(), *per_unit))
        .collect()
}

// ==========================================
// ManualGoals - 手工配额
// ==========================================
// 仅在 QuotaMode::Manual 下参与计算
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualGoals(BTreeMap<String, OptionalQuantity>);

impl ManualGoals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, material: &str) -> OptionalQuantity {
        self.0.get(material).copied().unwrap_or_default()
    }

    pub fn set(&mut self, material: &str, quantity: OptionalQuantity) {
        self.0.insert(material.to_string(), quantity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionalQuantity)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_recipe_table() {
        let table = RecipeTable::standard();
        assert!(table.contains_product("Colete"));
        assert_eq!(table.materials_for("Capuz").unwrap().get("Tecido"), Some(&1));
        assert_eq!(table.products().count(), 4);
    }

    #[test]
    fn test_production_targets_wire_shape() {
        let targets = ProductionTargets::from([("Colete", 3)]);
        let json = serde_json::to_value(&targets).unwrap();
        assert_eq!(json, serde_json::json!({"values": {"Colete": "3"}}));

        let back: ProductionTargets =
            serde_json::from_value(serde_json::json!({"values": {"Capuz": 5, "Algema": ""}})).unwrap();
        assert_eq!(back.get("Capuz"), OptionalQuantity::Value(5));
        assert_eq!(back.get("Algema"), OptionalQuantity::Empty);
        assert_eq!(back.get("Desconhecido"), OptionalQuantity::Empty);
    }
}
