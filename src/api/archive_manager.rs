// ==========================================
// 农场配额追踪 - 周期归档
// ==========================================
// 职责: 关闭周期 (快照排名 → 追加历史 → 重置台账), 历史查询/删除/导出
// 红线: 前置条件不满足时不产生任何修改
//       历史记录 id 由周期序号决定, 失败后重试不会重复追加
//       已归档的周期不会被不同内容覆盖或顶替
// ==========================================

use crate::api::context::FarmContext;
use crate::api::error::{ApiError, ApiResult, CloseStage};
use crate::api::validator::validate_close_preconditions;
use crate::domain::history::{CycleSnapshot, HistoryEntry, MemberStanding};
use crate::domain::roster::Roster;
use crate::i18n::{t, t_with_args};
use crate::repository::error::RepositoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 追加历史的结果
enum Appended {
    Stored,
    /// 同 id 记录已存在, 内容一致
    AlreadyArchived,
    /// 同 id 记录已存在, 内容不同或无法解析
    Occupied,
}

/// 关闭周期的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCycleReport {
    pub cycle: u64,
    pub entry_id: String,
    /// false: 该周期的历史记录已存在且内容一致 (上次关闭在重置阶段失败后的重试)
    pub appended: bool,
    pub standings: Vec<MemberStanding>,
}

// ==========================================
// ArchiveManager
// ==========================================
pub struct ArchiveManager {
    context: Arc<FarmContext>,
}

impl ArchiveManager {
    pub fn new(context: Arc<FarmContext>) -> Self {
        Self { context }
    }

    /// 以当前时间关闭周期
    pub async fn close_cycle(&self) -> ApiResult<CloseCycleReport> {
        self.close_cycle_at(Utc::now()).await
    }

    /// 关闭周期
    ///
    /// # 流程
    /// 1. 校验: 名单非空且至少一项正配额
    /// 2. 快照当前排名与配额
    /// 3. 以 `cycle-<序号>` 追加历史
    ///    - 已存在且内容一致: 视为重试, 跳过追加
    ///    - 已存在但内容不同 (台账序号落后于历史): 顺延到最新历史之后
    /// 4. 台账清空、进入已归档周期的下一周期, 并等待远端确认
    ///
    /// # 错误
    /// - ValidationError: 前置条件不满足, 无任何修改
    /// - CycleCloseFailed: 追加或重置失败, 可直接重试
    pub async fn close_cycle_at(&self, now: DateTime<Utc>) -> ApiResult<CloseCycleReport> {
        let ctx = &self.context;
        let roster = ctx.roster();
        let quotas = ctx.quotas();
        validate_close_preconditions(roster.len(), &quotas)?;

        let ledger = ctx.ledger();
        let standings = ctx.ranking.rank(&roster, &quotas, &ledger);
        let period_key = now.format("%Y-%m").to_string();
        let mut snapshot = CycleSnapshot {
            cycle: ledger.cycle(),
            label: t_with_args("archive.cycle_label", &[("period", &period_key)]),
            period_key,
            standings: standings.clone(),
            quotas,
            roster_size: roster.len(),
            quota_mode: ctx.quota_mode(),
            client_closed_at: now,
        };

        // ===== 追加历史 =====
        let appended = match self.append_snapshot(&snapshot).await? {
            Appended::Stored => true,
            Appended::AlreadyArchived => {
                tracing::warn!(cycle = snapshot.cycle, "周期快照已存在且内容一致, 跳过追加");
                false
            }
            Appended::Occupied => {
                let ledger_cycle = snapshot.cycle;
                let history = self.read_history().await?;
                // 之前已顺延归档过同一内容 (重置阶段失败后的重试)
                if let Some(entry) = history
                    .iter()
                    .find(|entry| entry.snapshot.cycle > ledger_cycle && entry.snapshot.same_content(&snapshot))
                {
                    tracing::warn!(entry_id = %entry.id, "周期快照已顺延归档, 跳过追加");
                    snapshot.cycle = entry.snapshot.cycle;
                    false
                } else {
                    let next = next_free_cycle(&history, ledger_cycle);
                    tracing::warn!(ledger_cycle, next, "台账周期序号已被其他归档占用, 顺延");
                    snapshot.cycle = next;
                    match self.append_snapshot(&snapshot).await? {
                        Appended::Stored => true,
                        _ => {
                            return Err(ApiError::close_failed(
                                CloseStage::AppendHistory,
                                format!("历史记录 {} 已存在", CycleSnapshot::entry_id(next)),
                            ))
                        }
                    }
                }
            }
        };
        let cycle = snapshot.cycle;
        let entry_id = CycleSnapshot::entry_id(cycle);

        // ===== 重置台账 =====
        self.reset_ledger(cycle, &roster).await?;

        tracing::info!(cycle, members = roster.len(), appended, "周期已关闭");
        Ok(CloseCycleReport {
            cycle,
            entry_id,
            appended,
            standings,
        })
    }

    async fn append_snapshot(&self, snapshot: &CycleSnapshot) -> ApiResult<Appended> {
        let ctx = &self.context;
        let entry_id = CycleSnapshot::entry_id(snapshot.cycle);
        let data =
            serde_json::to_value(snapshot).map_err(|e| ApiError::close_failed(CloseStage::AppendHistory, e))?;

        match ctx
            .remote
            .append_to_collection(ctx.history_collection(), &entry_id, data)
            .await
        {
            Ok(record) => {
                tracing::info!(entry_id = %record.id, server_seq = record.server_seq, "周期快照已归档");
                Ok(Appended::Stored)
            }
            Err(RepositoryError::Conflict { .. }) => {
                let existing = self
                    .read_history()
                    .await?
                    .into_iter()
                    .find(|entry| entry.id == entry_id);
                match existing {
                    Some(entry)
                        if entry.snapshot.cycle == snapshot.cycle && entry.snapshot.same_content(snapshot) =>
                    {
                        Ok(Appended::AlreadyArchived)
                    }
                    _ => Ok(Appended::Occupied),
                }
            }
            Err(e) => {
                tracing::error!(entry_id = %entry_id, "追加周期快照失败: {}", e);
                Err(ApiError::close_failed(CloseStage::AppendHistory, e))
            }
        }
    }

    async fn read_history(&self) -> ApiResult<Vec<HistoryEntry>> {
        self.history()
            .await
            .map_err(|e| ApiError::close_failed(CloseStage::AppendHistory, e))
    }

    async fn reset_ledger(&self, closed_cycle: u64, roster: &Roster) -> ApiResult<()> {
        let ctx = &self.context;
        let materials = ctx.ledger_materials();
        let ids = roster.ids();

        let previous = ctx.ledger();
        let mut reset = previous.clone();
        reset.reset_for_next_cycle(closed_cycle, &materials, &ids);

        let write = ctx.ledger.set(reset.clone());
        if let Err(e) = write.settle().await {
            // 远端未接受重置: 撤回本地, 下次重试仍落在同一周期序号
            ctx.ledger.rollback_if(&reset, previous);
            return Err(ApiError::close_failed(CloseStage::ResetLedger, e));
        }
        Ok(())
    }

    // ==========================================
    // 历史查询
    // ==========================================

    /// 历史记录, 新的在前; 无法解析的记录跳过
    pub async fn history(&self) -> ApiResult<Vec<HistoryEntry>> {
        let records = self
            .context
            .remote
            .query_ordered_by_timestamp_desc(self.context.history_collection())
            .await?;

        let entries = records
            .into_iter()
            .filter_map(|record| {
                let id = record.id.clone();
                match HistoryEntry::from_record(record) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!(entry_id = %id, "历史记录格式不符, 跳过: {}", e);
                        None
                    }
                }
            })
            .collect();
        Ok(entries)
    }

    /// 按 id 查找历史记录
    pub async fn find_entry(&self, id: &str) -> ApiResult<HistoryEntry> {
        self.history()
            .await?
            .into_iter()
            .find(|entry| entry.id == id)
            .ok_or_else(|| ApiError::NotFound {
                entity: "HistoryEntry".to_string(),
                id: id.to_string(),
            })
    }

    /// 删除历史记录 (须显式确认)
    pub async fn delete_entry(&self, id: &str, confirmed: bool) -> ApiResult<()> {
        if !confirmed {
            return Err(ApiError::ConfirmationRequired { id: id.to_string() });
        }

        let existed = self
            .context
            .remote
            .delete_from_collection(self.context.history_collection(), id)
            .await?;
        if !existed {
            return Err(ApiError::NotFound {
                entity: "HistoryEntry".to_string(),
                id: id.to_string(),
            });
        }

        tracing::info!(entry_id = %id, "历史记录已删除");
        Ok(())
    }

    /// 导出某条历史记录的排名为 CSV (表头按当前语言)
    pub async fn export_csv(&self, id: &str) -> ApiResult<String> {
        let entry = self.find_entry(id).await?;
        standings_to_csv(entry.standings())
    }
}

/// 最新已归档周期之后的序号 (不小于 floor + 1)
fn next_free_cycle(history: &[HistoryEntry], floor: u64) -> u64 {
    history
        .iter()
        .map(|entry| entry.snapshot.cycle)
        .max()
        .unwrap_or(0)
        .max(floor)
        .saturating_add(1)
}

/// 排名 → CSV 文本
pub fn standings_to_csv(standings: &[MemberStanding]) -> ApiResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "#".to_string(),
            t("archive.csv_member"),
            t("archive.csv_delivered"),
            t("archive.csv_target"),
            t("archive.csv_percent"),
            t("archive.csv_tier"),
        ])
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    for (rank, standing) in standings.iter().enumerate() {
        writer
            .write_record([
                (rank + 1).to_string(),
                standing.name.clone(),
                standing.total_delivered.to_string(),
                standing.total_target.to_string(),
                format!("{}%", standing.percent),
                t(standing.tier.label_key()),
            ])
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ApiError::InternalError(e.to_string()))
}
