// ==========================================
// 农场配额追踪 - 成员管理
// ==========================================
// 职责: 名单增/改/删, 随后整形交付台账
// 红线: 校验失败不修改名单与台账
//       删除第 k 个成员后, 其后成员在位置视图中前移一位
// ==========================================

use crate::api::context::FarmContext;
use crate::api::error::ApiResult;
use crate::api::validator::{validate_member_index, validate_member_name, ValidationFailure};
use crate::domain::roster::{Member, Roster};
use crate::domain::types::MemberId;
use std::sync::Arc;

// ==========================================
// MembershipManager
// ==========================================
pub struct MembershipManager {
    context: Arc<FarmContext>,
}

impl MembershipManager {
    pub fn new(context: Arc<FarmContext>) -> Self {
        Self { context }
    }

    /// 当前名单
    pub fn list(&self) -> Roster {
        self.context.roster()
    }

    /// 新增成员 (分配新的成员 id)
    pub fn add(&self, name: &str) -> ApiResult<MemberId> {
        let member = Member::new(validate_member_name(name)?);
        let id = member.id.clone();
        tracing::info!(member_id = %id, name = %member.name, "成员已加入");

        let _ = self.context.roster.update(|roster| {
            let mut next = roster.clone();
            next.push_member(member);
            next
        });
        let _ = self.context.reconcile_ledger();
        Ok(id)
    }

    /// 重命名第 index 个成员
    pub fn rename(&self, index: usize, name: &str) -> ApiResult<()> {
        let name = validate_member_name(name)?;

        let _ = self.context.roster.try_update(|roster| {
            validate_member_index(index, roster.len())?;
            let mut next = roster.clone();
            next.rename(index, name.clone());
            ApiResult::Ok(next)
        })?;
        let _ = self.context.reconcile_ledger();

        tracing::info!(index, name = %name, "成员已改名");
        Ok(())
    }

    /// 删除第 index 个成员, 其台账列一并移除
    pub fn remove(&self, index: usize) -> ApiResult<Member> {
        let mut removed = None;
        let _ = self.context.roster.try_update(|roster| {
            let mut next = roster.clone();
            removed = next.remove(index);
            if removed.is_none() {
                return Err(ValidationFailure::MemberIndexOutOfRange { index });
            }
            Ok(next)
        })?;
        let _ = self.context.reconcile_ledger();

        let member = removed.ok_or(ValidationFailure::MemberIndexOutOfRange { index })?;
        tracing::info!(member_id = %member.id, index, "成员已移除");
        Ok(member)
    }
}
