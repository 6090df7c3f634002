// ==========================================
// 农场配额追踪 - 成员名单领域模型
// ==========================================
// 对齐: members 文档 {members: [{id, name}]}
// 兼容: 旧版 {names: [...]} 与本地回退中的裸数组 [...]
// ==========================================
// 红线: 成员以 id 标识, 位置仅用于展示顺序
// ==========================================

use crate::domain::types::MemberId;
use serde::{Deserialize, Serialize};

// ==========================================
// Member - 成员
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: MemberId::generate(),
            name: name.into(),
        }
    }
}

// 读取时兼容的三种形态
#[derive(Deserialize)]
#[serde(untagged)]
enum RosterWire {
    Keyed { members: Vec<Member> },
    Legacy { names: Vec<String> },
    Bare(Vec<String>),
}

impl From<RosterWire> for Roster {
    fn from(wire: RosterWire) -> Self {
        match wire {
            RosterWire::Keyed { members } => Roster { members },
            RosterWire::Legacy { names } | RosterWire::Bare(names) => Roster::from_legacy_names(names),
        }
    }
}

// ==========================================
// Roster - 有序成员名单
// ==========================================
// 不强制名称唯一
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RosterWire")]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以名称列表创建新名单(为每个成员生成新 id)
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Roster {
            members: names.into_iter().map(Member::new).collect(),
        }
    }

    /// 默认名单: 成员 1..=8
    pub fn standard() -> Self {
        Roster::with_names((1..=8).map(|i| format!("Membro {}", i)))
    }

    /// 旧版位置数据 → 确定性 id
    pub fn from_legacy_names(names: Vec<String>) -> Self {
        Roster {
            members: names
                .into_iter()
                .enumerate()
                .map(|(index, name)| Member {
                    id: MemberId::legacy(index),
                    name,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    pub fn position(&self, id: &MemberId) -> Option<usize> {
        self.members.iter().position(|m| &m.id == id)
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.position(id).is_some()
    }

    pub fn ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// 追加成员, 返回新 id
    pub fn push(&mut self, name: impl Into<String>) -> MemberId {
        let member = Member::new(name);
        let id = member.id.clone();
        self.members.push(member);
        id
    }

    /// 追加已构造的成员
    pub fn push_member(&mut self, member: Member) {
        self.members.push(member);
    }

    /// 改名; 越界返回 false
    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> bool {
        match self.members.get_mut(index) {
            Some(member) => {
                member.name = name.into();
                true
            }
            None => false,
        }
    }

    /// 移除; 之后的成员位置依次前移
    pub fn remove(&mut self, index: usize) -> Option<Member> {
        if index < self.members.len() {
            Some(self.members.remove(index))
        } else {
            None
        }
    }
}
