// ==========================================
// 农场配额追踪 - 领域类型定义
// ==========================================
// 职责: 数量、成员标识、奖牌等级、交付状态、配额模式
// 红线: 数量在输入边界校验,内部只存整数
// ==========================================

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ==========================================
// 领域错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("无效的数量: '{raw}' (仅接受空白或非负整数)")]
    InvalidQuantity { raw: String },
}

// ==========================================
// 可空数量 (Optional Quantity)
// ==========================================
// 空白与 0 不同: 空白表示"尚未填写"
// 序列化格式: 数字字符串, 空白为 ""
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OptionalQuantity {
    #[default]
    Empty,
    Value(u64),
}

impl OptionalQuantity {
    /// 严格解析用户输入
    ///
    /// # 规则
    /// - 空白(含纯空格) → Empty
    /// - 非负整数 → Value
    /// - 其他(负数、小数、文本) → 错误
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(OptionalQuantity::Empty);
        }

        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::InvalidQuantity {
                raw: raw.to_string(),
            });
        }

        trimmed
            .parse::<u64>()
            .map(OptionalQuantity::Value)
            .map_err(|_| DomainError::InvalidQuantity {
                raw: raw.to_string(),
            })
    }

    /// 数值视图, 空白按 0 计
    pub fn value(&self) -> u64 {
        match self {
            OptionalQuantity::Empty => 0,
            OptionalQuantity::Value(v) => *v,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, OptionalQuantity::Empty)
    }
}

impl From<u64> for OptionalQuantity {
    fn from(v: u64) -> Self {
        OptionalQuantity::Value(v)
    }
}

impl FromStr for OptionalQuantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OptionalQuantity::parse(s)
    }
}

impl fmt::Display for OptionalQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionalQuantity::Empty => Ok(()),
            OptionalQuantity::Value(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for OptionalQuantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// 远端数据可能由旧客户端写入(数字、小数、null、脏文本)
// 读取时宽松处理: 无法识别的值视为空白, 小数向下取整
struct OptionalQuantityVisitor;

impl<'de> Visitor<'de> for OptionalQuantityVisitor {
    type Value = OptionalQuantity;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a numeric string, a number, or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        if let Ok(q) = OptionalQuantity::parse(v) {
            return Ok(q);
        }
        match v.trim().parse::<f64>() {
            Ok(f) => Ok(coerce_float(f)),
            Err(_) => Ok(OptionalQuantity::Empty),
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(OptionalQuantity::Value(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(u64::try_from(v)
            .map(OptionalQuantity::Value)
            .unwrap_or(OptionalQuantity::Empty))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(coerce_float(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OptionalQuantity::Empty)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OptionalQuantity::Empty)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(OptionalQuantityVisitor)
    }
}

fn coerce_float(f: f64) -> OptionalQuantity {
    if f.is_finite() && f >= 0.0 {
        OptionalQuantity::Value(f.floor() as u64)
    } else {
        OptionalQuantity::Empty
    }
}

impl<'de> Deserialize<'de> for OptionalQuantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OptionalQuantityVisitor)
    }
}

// ==========================================
// 成员标识 (Member Id)
// ==========================================
// 创建时生成, 之后不随名单位置变化
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// 生成新的随机标识 (UUID v4)
    pub fn generate() -> Self {
        MemberId(uuid::Uuid::new_v4().to_string())
    }

    /// 旧版按位置存储的数据使用确定性标识, 保证各客户端解码一致
    pub fn legacy(index: usize) -> Self {
        MemberId(format!("legacy-{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        MemberId(s.to_string())
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==========================================
// 奖牌等级 (Tier)
// ==========================================
// 顺序: Gold(第一档) > Silver(第二档) > Bronze(第三档) > Unplaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Gold,
    Silver,
    Bronze,
    Unplaced,
}

impl Tier {
    /// i18n 文案键
    pub fn label_key(&self) -> &'static str {
        match self {
            Tier::Gold => "tier.gold",
            Tier::Silver => "tier.silver",
            Tier::Bronze => "tier.bronze",
            Tier::Unplaced => "tier.unplaced",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Gold => write!(f, "GOLD"),
            Tier::Silver => write!(f, "SILVER"),
            Tier::Bronze => write!(f, "BRONZE"),
            Tier::Unplaced => write!(f, "UNPLACED"),
        }
    }
}

// ==========================================
// 交付状态 (Delivery Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    NotApplicable, // 目标为 0
    Reached,       // 已达成
    Partial,       // 部分完成
    Pending,       // 待完成
}

impl DeliveryStatus {
    /// i18n 文案键
    pub fn label_key(&self) -> &'static str {
        match self {
            DeliveryStatus::NotApplicable => "status.not_applicable",
            DeliveryStatus::Reached => "status.reached",
            DeliveryStatus::Partial => "status.partial",
            DeliveryStatus::Pending => "status.pending",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::NotApplicable => write!(f, "NOT_APPLICABLE"),
            DeliveryStatus::Reached => write!(f, "REACHED"),
            DeliveryStatus::Partial => write!(f, "PARTIAL"),
            DeliveryStatus::Pending => write!(f, "PENDING"),
        }
    }
}

// ==========================================
// 配额模式 (Quota Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotaMode {
    #[default]
    EvenSplit, // 材料总量按人数均分(向上取整)
    Manual,    // goals 文档手工设定
}

impl fmt::Display for QuotaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaMode::EvenSplit => write!(f, "EVEN_SPLIT"),
            QuotaMode::Manual => write!(f, "MANUAL"),
        }
    }
}

impl QuotaMode {
    /// 从配置字符串解析, 无法识别时返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "EVEN_SPLIT" => Some(QuotaMode::EvenSplit),
            "MANUAL" => Some(QuotaMode::Manual),
            _ => None,
        }
    }
}
