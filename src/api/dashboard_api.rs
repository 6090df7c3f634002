// ==========================================
// 农场配额追踪 - 看板 API
// ==========================================
// 职责: 派生指标的聚合查询 (只读)
// 约定: 每次调用基于当前本地值重新计算, 不缓存
// ==========================================

use crate::api::context::FarmContext;
use crate::api::error::ApiResult;
use crate::api::validator::ValidationFailure;
use crate::domain::history::MemberStanding;
use crate::domain::types::{OptionalQuantity, QuotaMode};
use crate::engine::quota::Quotas;
use crate::engine::ranking::completion_percent;
use crate::engine::recipe::MaterialTotals;
use crate::engine::status::{MaterialProgress, MemberMaterialProgress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 单个成员的进度视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProgress {
    pub standing: MemberStanding,
    pub materials: Vec<MemberMaterialProgress>,
}

/// 团队总览
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamOverview {
    pub cycle: u64,
    pub quota_mode: QuotaMode,
    pub member_count: usize,
    pub total_required: u64,
    pub total_delivered: u64,
    pub percent: u32,
}

/// 台账位置视图: 材料 → 按名单顺序的数量
pub type LedgerGrid = BTreeMap<String, Vec<OptionalQuantity>>;

// ==========================================
// DashboardApi
// ==========================================
pub struct DashboardApi {
    context: Arc<FarmContext>,
}

impl DashboardApi {
    pub fn new(context: Arc<FarmContext>) -> Self {
        Self { context }
    }

    pub fn material_totals(&self) -> MaterialTotals {
        self.context.material_totals()
    }

    pub fn quotas(&self) -> Quotas {
        self.context.quotas()
    }

    pub fn ranking(&self) -> Vec<MemberStanding> {
        self.context.ranking()
    }

    /// 各材料团队进度 (对照材料总需求)
    pub fn material_progress(&self) -> Vec<MaterialProgress> {
        let totals = self.context.material_totals();
        self.context
            .ledger
            .read(|ledger| self.context.status.material_progress(&totals, ledger))
    }

    /// 第 index 个成员的进度
    pub fn member_progress(&self, index: usize) -> ApiResult<MemberProgress> {
        let roster = self.context.roster();
        let member = roster
            .get(index)
            .ok_or(ValidationFailure::MemberIndexOutOfRange { index })?;
        let quotas = self.context.quotas();
        let ledger = self.context.ledger();

        let standing = self.context.ranking.standing_for(index, member, &quotas, &ledger);
        let materials = self.context.status.member_breakdown(&member.id, &quotas, &ledger);
        Ok(MemberProgress { standing, materials })
    }

    /// 台账的位置视图
    pub fn ledger_grid(&self) -> LedgerGrid {
        let ids = self.context.roster().ids();
        self.context.ledger.read(|ledger| {
            ledger
                .materials()
                .map(|material| (material.clone(), ledger.row_for(material, &ids)))
                .collect()
        })
    }

    /// 团队总览
    pub fn overview(&self) -> TeamOverview {
        let totals = self.context.material_totals();
        let ledger = self.context.ledger();
        let total_required = totals.values().copied().fold(0, u64::saturating_add);
        let total_delivered = totals
            .keys()
            .map(|material| ledger.total_for_material(material))
            .fold(0, u64::saturating_add);

        TeamOverview {
            cycle: ledger.cycle(),
            quota_mode: self.context.quota_mode(),
            member_count: self.context.roster().len(),
            total_required,
            total_delivered,
            percent: completion_percent(total_delivered, total_required),
        }
    }
}
