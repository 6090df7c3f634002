// ==========================================
// 农场配额追踪 - 周期历史领域模型
// ==========================================
// 红线: 历史记录只追加, 写入后不可修改 (可显式删除)
// 对齐: history 集合, 服务端排序, 倒序读取
// ==========================================

use crate::domain::types::{MemberId, QuotaMode, Tier};
use crate::repository::remote_store::StoredRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// MemberStanding - 成员排名条目
// ==========================================
// 排名计算的输出, 同时作为历史快照的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStanding {
    pub member_id: MemberId,
    pub name: String,
    pub roster_index: usize,   // 名单中的原始位置
    pub total_delivered: u64,  // 已交付合计
    pub total_target: u64,     // 配额合计
    pub percent: u32,          // 完成度 0..=100
    pub tier: Tier,            // 奖牌等级
}

// ==========================================
// CycleSnapshot - 追加到 history 集合的数据体
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSnapshot {
    pub cycle: u64,                      // 被关闭的周期序号
    pub label: String,                   // 展示名称
    pub period_key: String,              // 周期键 (YYYY-MM)
    pub standings: Vec<MemberStanding>,  // 关闭时排名
    pub quotas: BTreeMap<String, u64>,   // 关闭时配额
    pub roster_size: usize,              // 关闭时人数
    pub quota_mode: QuotaMode,           // 配额依据
    pub client_closed_at: DateTime<Utc>, // 客户端时钟 (仅参考, 排序以服务端为准)
}

impl CycleSnapshot {
    /// 确定性历史记录 id: 同一周期重复关闭只会命中同一条记录
    pub fn entry_id(cycle: u64) -> String {
        format!("cycle-{}", cycle)
    }

    /// 归档内容是否相同 (不比较周期序号、展示名称与客户端时钟)
    pub fn same_content(&self, other: &CycleSnapshot) -> bool {
        self.standings == other.standings
            && self.quotas == other.quotas
            && self.roster_size == other.roster_size
            && self.quota_mode == other.quota_mode
    }
}

// ==========================================
// HistoryEntry - 历史记录 (含服务端元数据)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub server_seq: u64,           // 服务端单调序号
    pub closed_at: DateTime<Utc>,  // 服务端时间戳
    pub snapshot: CycleSnapshot,
}

impl HistoryEntry {
    /// 从集合记录解码
    pub fn from_record(record: StoredRecord) -> Result<Self, serde_json::Error> {
        let snapshot: CycleSnapshot = serde_json::from_value(record.data)?;
        Ok(Self {
            id: record.id,
            server_seq: record.server_seq,
            closed_at: record.server_ts,
            snapshot,
        })
    }

    pub fn label(&self) -> &str {
        &self.snapshot.label
    }

    pub fn period_key(&self) -> &str {
        &self.snapshot.period_key
    }

    pub fn standings(&self) -> &[MemberStanding] {
        &self.snapshot.standings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_id_is_deterministic() {
        assert_eq!(CycleSnapshot::entry_id(7), "cycle-7");
    }

    #[test]
    fn test_from_record_uses_server_metadata() {
        let snapshot = CycleSnapshot {
            cycle: 2,
            label: "2026-10".to_string(),
            period_key: "2026-10".to_string(),
            standings: vec![],
            quotas: BTreeMap::from([("Ferro".to_string(), 10)]),
            roster_size: 3,
            quota_mode: QuotaMode::EvenSplit,
            client_closed_at: Utc::now(),
        };
        let server_ts = Utc::now();
        let record = StoredRecord {
            id: "cycle-2".to_string(),
            server_seq: 11,
            server_ts,
            data: serde_json::to_value(&snapshot).unwrap(),
        };

        let entry = HistoryEntry::from_record(record).unwrap();
        assert_eq!(entry.server_seq, 11);
        assert_eq!(entry.closed_at, server_ts);
        assert_eq!(entry.snapshot, snapshot);
    }

    #[test]
    fn test_same_content_ignores_label_and_clock() {
        let snapshot = CycleSnapshot {
            cycle: 1,
            label: "2026-10".to_string(),
            period_key: "2026-10".to_string(),
            standings: vec![],
            quotas: BTreeMap::from([("Ferro".to_string(), 10)]),
            roster_size: 3,
            quota_mode: QuotaMode::EvenSplit,
            client_closed_at: Utc::now(),
        };
        let retried = CycleSnapshot {
            cycle: 2,
            label: "October 2026".to_string(),
            client_closed_at: Utc::now() + chrono::Duration::minutes(5),
            ..snapshot.clone()
        };
        assert!(snapshot.same_content(&retried));

        let other = CycleSnapshot {
            quotas: BTreeMap::from([("Ferro".to_string(), 12)]),
            ..snapshot.clone()
        };
        assert!(!snapshot.same_content(&other));
    }

    #[test]
    fn test_from_record_rejects_foreign_shape() {
        let record = StoredRecord {
            id: "x".to_string(),
            server_seq: 1,
            server_ts: Utc::now(),
            data: json!({"mes": "Outubro", "producao": 3}),
        };
        assert!(HistoryEntry::from_record(record).is_err());
    }
}
