// ==========================================
// 农场配额追踪 - 录入 API
// ==========================================
// 职责: 产量目标、成员交付、手工配额的录入
// 红线: 数量仅接受空白或非负整数, 非法输入保留原值
//       未知/越界成员的交付录入为 no-op
// ==========================================

use crate::api::context::FarmContext;
use crate::api::error::{ApiError, ApiResult};
use crate::api::validator::{validate_product, validate_quantity};
use crate::domain::types::{MemberId, OptionalQuantity};
use std::sync::Arc;

// ==========================================
// DeliveryApi
// ==========================================
pub struct DeliveryApi {
    context: Arc<FarmContext>,
}

impl DeliveryApi {
    pub fn new(context: Arc<FarmContext>) -> Self {
        Self { context }
    }

    /// 设置某产品的目标产量, 材料集合变化时整形台账
    pub fn set_production_target(&self, product: &str, raw: &str) -> ApiResult<()> {
        validate_product(self.context.recipe.table(), product)?;
        let quantity = validate_quantity(raw)?;

        let _ = self.context.production.update(|targets| {
            let mut next = targets.clone();
            next.set(product, quantity);
            next
        });
        let _ = self.context.reconcile_ledger();

        tracing::debug!(product, quantity = %quantity, "目标产量已更新");
        Ok(())
    }

    /// 按名单位置录入交付量
    ///
    /// # 返回
    /// - Ok(true): 已写入
    /// - Ok(false): 成员序号越界或材料不在台账中, 未做修改
    pub fn set_delivery(&self, material: &str, member_index: usize, raw: &str) -> ApiResult<bool> {
        let quantity = validate_quantity(raw)?;
        let member = self
            .context
            .roster
            .read(|roster| roster.get(member_index).map(|m| m.id.clone()));
        match member {
            Some(id) => Ok(self.write_cell(material, &id, raw, quantity)),
            None => {
                tracing::debug!(material, member_index, "成员序号越界, 忽略录入");
                Ok(false)
            }
        }
    }

    /// 按成员 id 录入交付量
    pub fn set_delivery_for(&self, material: &str, member: &MemberId, raw: &str) -> ApiResult<bool> {
        let quantity = validate_quantity(raw)?;
        Ok(self.write_cell(material, member, raw, quantity))
    }

    fn write_cell(
        &self,
        material: &str,
        member: &MemberId,
        raw: &str,
        quantity: OptionalQuantity,
    ) -> bool {
        let written = self
            .context
            .ledger
            .update_if(|ledger| {
                let mut next = ledger.clone();
                next.set_quantity(material, member, quantity).then_some(next)
            })
            .is_some();
        if !written {
            tracing::debug!(material, member_id = %member, raw, "台账中无此单元格, 忽略录入");
        }
        written
    }

    /// 设置手工配额 (仅 MANUAL 模式参与配额计算)
    pub fn set_goal(&self, material: &str, raw: &str) -> ApiResult<()> {
        let material = material.trim();
        if material.is_empty() {
            return Err(ApiError::InvalidInput("材料名称为空".to_string()));
        }
        let quantity = validate_quantity(raw)?;

        let _ = self.context.goals.update(|goals| {
            let mut next = goals.clone();
            next.set(material, quantity);
            next
        });
        let _ = self.context.reconcile_ledger();
        Ok(())
    }
}
