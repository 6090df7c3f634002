// ==========================================
// 农场配额追踪 - 共享状态上下文
// ==========================================
// 职责: 持有四个共享槽位与派生计算引擎, 供各 API 复用
// 槽位: production / members / delivered / goals
// 派生: 材料总量、配额、台账材料集合、排名 (每次读取重新计算)
// ==========================================

use crate::config::farm_config::FarmConfig;
use crate::domain::history::MemberStanding;
use crate::domain::ledger::DeliveryLedger;
use crate::domain::production::{ManualGoals, ProductionTargets};
use crate::domain::roster::Roster;
use crate::domain::types::QuotaMode;
use crate::engine::quota::{ledger_materials, resolve_quotas, Quotas};
use crate::engine::ranking::RankingCalculator;
use crate::engine::recipe::{MaterialTotals, RecipeEngine};
use crate::engine::status::StatusEvaluator;
use crate::repository::fallback_store::FallbackStore;
use crate::repository::remote_store::RemoteDocumentStore;
use crate::sync::{documents, ColdStartOutcome, PendingWrite, SharedStateStore, SlotKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

/// 各槽位的冷启动结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdStartReport {
    pub production: ColdStartOutcome,
    pub members: ColdStartOutcome,
    pub delivered: ColdStartOutcome,
    pub goals: ColdStartOutcome,
}

// ==========================================
// FarmContext
// ==========================================
pub struct FarmContext {
    pub(crate) production: SharedStateStore<ProductionTargets>,
    pub(crate) roster: SharedStateStore<Roster>,
    pub(crate) ledger: SharedStateStore<DeliveryLedger>,
    pub(crate) goals: SharedStateStore<ManualGoals>,
    pub(crate) remote: Arc<dyn RemoteDocumentStore>,
    pub(crate) recipe: RecipeEngine,
    pub(crate) ranking: RankingCalculator,
    pub(crate) status: StatusEvaluator,
    quota_mode: QuotaMode,
    history_collection: String,
}

impl FarmContext {
    /// 并发打开四个槽位并完成冷启动
    pub async fn open(
        remote: Arc<dyn RemoteDocumentStore>,
        fallback: Arc<dyn FallbackStore>,
        config: &FarmConfig,
    ) -> (Self, ColdStartReport) {
        let ns = config.namespace.as_str();

        let (production, roster, ledger, goals) =
            futures::join!(
                SharedStateStore::open(
                    SlotKey::new(ns, documents::PRODUCTION),
                    Arc::clone(&remote),
                    Arc::clone(&fallback),
                    config.default_production.clone(),
                ),
                SharedStateStore::open(
                    SlotKey::new(ns, documents::MEMBERS),
                    Arc::clone(&remote),
                    Arc::clone(&fallback),
                    config.default_roster(),
                ),
                SharedStateStore::open(
                    SlotKey::new(ns, documents::DELIVERED),
                    Arc::clone(&remote),
                    Arc::clone(&fallback),
                    DeliveryLedger::new(),
                ),
                SharedStateStore::open(
                    SlotKey::new(ns, documents::GOALS),
                    Arc::clone(&remote),
                    Arc::clone(&fallback),
                    ManualGoals::new(),
                ),
            );

        let (production, production_outcome) = production;
        let (roster, members_outcome) = roster;
        let (ledger, delivered_outcome) = ledger;
        let (goals, goals_outcome) = goals;

        let report = ColdStartReport {
            production: production_outcome,
            members: members_outcome,
            delivered: delivered_outcome,
            goals: goals_outcome,
        };

        let history_collection = SlotKey::new(ns, documents::HISTORY).remote_key().to_string();
        let context = Self {
            production,
            roster,
            ledger,
            goals,
            remote,
            recipe: RecipeEngine::new(config.recipe_table.clone()),
            ranking: RankingCalculator::new(config.tier_policy),
            status: StatusEvaluator::new(config.partial_ratio_pct),
            quota_mode: config.quota_mode,
            history_collection,
        };
        (context, report)
    }

    pub fn quota_mode(&self) -> QuotaMode {
        self.quota_mode
    }

    pub fn history_collection(&self) -> &str {
        &self.history_collection
    }

    // ===== 槽位快照 =====

    pub fn production_targets(&self) -> ProductionTargets {
        self.production.snapshot()
    }

    pub fn roster(&self) -> Roster {
        self.roster.snapshot()
    }

    pub fn ledger(&self) -> DeliveryLedger {
        self.ledger.snapshot()
    }

    pub fn goals(&self) -> ManualGoals {
        self.goals.snapshot()
    }

    // ===== 派生指标 =====

    pub fn material_totals(&self) -> MaterialTotals {
        self.production.read(|targets| self.recipe.material_totals(targets))
    }

    pub fn quotas(&self) -> Quotas {
        let totals = self.material_totals();
        let member_count = self.roster.read(Roster::len);
        self.goals
            .read(|goals| resolve_quotas(self.quota_mode, &totals, member_count, goals))
    }

    /// 台账应覆盖的材料集合
    pub fn ledger_materials(&self) -> BTreeSet<String> {
        let totals = self.material_totals();
        self.goals
            .read(|goals| ledger_materials(self.quota_mode, &totals, goals))
    }

    pub fn ranking(&self) -> Vec<MemberStanding> {
        let roster = self.roster();
        let quotas = self.quotas();
        self.ledger
            .read(|ledger| self.ranking.rank(&roster, &quotas, ledger))
    }

    // ===== 台账整形 =====

    /// 按当前名单与材料集合整形台账; 形状一致时不写入
    pub fn reconcile_ledger(&self) -> Option<PendingWrite> {
        let materials = self.ledger_materials();
        let ids = self.roster.read(Roster::ids);
        self.ledger.update_if(|ledger| {
            let mut next = ledger.clone();
            if next.reconcile_shape(&materials, &ids) {
                tracing::debug!(
                    materials = materials.len(),
                    members = ids.len(),
                    "台账形状已调整"
                );
                Some(next)
            } else {
                None
            }
        })
    }

    /// 所有槽位的修订号之和 (用于判断派生指标是否需要刷新)
    pub fn revision(&self) -> u64 {
        self.production.revision() + self.roster.revision() + self.ledger.revision() + self.goals.revision()
    }

    /// 影响台账形状的槽位修订号 (名单/产量/目标/台账)
    pub fn shape_watchers(&self) -> [watch::Receiver<u64>; 4] {
        [
            self.roster.watch(),
            self.production.watch(),
            self.goals.watch(),
            self.ledger.watch(),
        ]
    }

    /// 等待所有槽位已入队的写入落定
    pub async fn flush(&self) {
        futures::join!(
            self.production.flush(),
            self.roster.flush(),
            self.ledger.flush(),
            self.goals.flush(),
        );
    }

    /// 停止监听远端
    pub fn unsubscribe_all(&self) {
        self.production.unsubscribe();
        self.roster.unsubscribe();
        self.ledger.unsubscribe();
        self.goals.unsubscribe();
    }
}
