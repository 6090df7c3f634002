// ==========================================
// 农场配额追踪 - 输入校验
// ==========================================
// 职责: API 边界上的输入校验
// 约定: 校验失败不产生任何修改 (本地与远端均不变)
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::production::RecipeTable;
use crate::domain::types::OptionalQuantity;
use crate::engine::quota::{has_positive_quota, Quotas};
use crate::i18n::{t, t_with_args};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// ValidationFailure - 校验失败原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationFailure {
    #[error("名单为空")]
    EmptyRoster,

    #[error("没有任何正配额")]
    NoPositiveQuota,

    #[error("成员名称为空")]
    EmptyName,

    #[error("数量无效: {raw}")]
    InvalidQuantity { raw: String },

    #[error("未知产品: {product}")]
    UnknownProduct { product: String },

    #[error("未知材料: {material}")]
    UnknownMaterial { material: String },

    #[error("成员序号越界: {index}")]
    MemberIndexOutOfRange { index: usize },
}

impl ValidationFailure {
    /// 本地化提示
    pub fn user_message(&self) -> String {
        match self {
            ValidationFailure::EmptyRoster => t("validation.empty_roster"),
            ValidationFailure::NoPositiveQuota => t("validation.no_positive_quota"),
            ValidationFailure::EmptyName => t("validation.empty_name"),
            ValidationFailure::InvalidQuantity { raw } => {
                t_with_args("validation.invalid_quantity", &[("raw", raw)])
            }
            ValidationFailure::UnknownProduct { product } => {
                t_with_args("validation.unknown_product", &[("product", product)])
            }
            ValidationFailure::UnknownMaterial { material } => {
                t_with_args("validation.unknown_material", &[("material", material)])
            }
            ValidationFailure::MemberIndexOutOfRange { index } => t_with_args(
                "validation.member_index_out_of_range",
                &[("index", &index.to_string())],
            ),
        }
    }
}

impl From<ValidationFailure> for ApiError {
    fn from(failure: ValidationFailure) -> Self {
        ApiError::ValidationError(failure)
    }
}

/// 成员名称: 去除首尾空白后不得为空
pub fn validate_member_name(name: &str) -> ApiResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationFailure::EmptyName.into());
    }
    Ok(trimmed.to_string())
}

/// 成员序号须在名单范围内
pub fn validate_member_index(index: usize, roster_len: usize) -> ApiResult<()> {
    if index >= roster_len {
        return Err(ValidationFailure::MemberIndexOutOfRange { index }.into());
    }
    Ok(())
}

/// 产品须在配方表中
pub fn validate_product(table: &RecipeTable, product: &str) -> ApiResult<()> {
    if !table.contains_product(product) {
        return Err(ValidationFailure::UnknownProduct {
            product: product.to_string(),
        }
        .into());
    }
    Ok(())
}

/// 数量: 空白或非负整数
pub fn validate_quantity(raw: &str) -> ApiResult<OptionalQuantity> {
    Ok(OptionalQuantity::parse(raw)?)
}

/// 关闭周期前置条件: 名单非空且至少一项正配额
pub fn validate_close_preconditions(roster_len: usize, quotas: &Quotas) -> ApiResult<()> {
    if roster_len == 0 {
        return Err(ValidationFailure::EmptyRoster.into());
    }
    if !has_positive_quota(quotas) {
        return Err(ValidationFailure::NoPositiveQuota.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(err: ApiError) -> ValidationFailure {
        match err {
            ApiError::ValidationError(failure) => failure,
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_member_name() {
        assert_eq!(validate_member_name("  Ana ").unwrap(), "Ana");
        assert_eq!(failure(validate_member_name("   ").unwrap_err()), ValidationFailure::EmptyName);
    }

    #[test]
    fn test_member_index() {
        assert!(validate_member_index(1, 2).is_ok());
        assert_eq!(
            failure(validate_member_index(2, 2).unwrap_err()),
            ValidationFailure::MemberIndexOutOfRange { index: 2 }
        );
    }

    #[test]
    fn test_quantity() {
        assert_eq!(validate_quantity("12").unwrap(), OptionalQuantity::Value(12));
        assert_eq!(validate_quantity("").unwrap(), OptionalQuantity::Empty);
        assert_eq!(
            failure(validate_quantity("-1").unwrap_err()),
            ValidationFailure::InvalidQuantity { raw: "-1".to_string() }
        );
    }

    #[test]
    fn test_close_preconditions() {
        let quotas = Quotas::from([("Ferro".to_string(), 0)]);
        assert_eq!(
            failure(validate_close_preconditions(0, &quotas).unwrap_err()),
            ValidationFailure::EmptyRoster
        );
        assert_eq!(
            failure(validate_close_preconditions(3, &quotas).unwrap_err()),
            ValidationFailure::NoPositiveQuota
        );
        let quotas = Quotas::from([("Ferro".to_string(), 4)]);
        assert!(validate_close_preconditions(3, &quotas).is_ok());
    }

    #[test]
    fn test_product() {
        let table = RecipeTable::standard();
        assert!(validate_product(&table, "Colete").is_ok());
        assert!(validate_product(&table, "Espada").is_err());
    }
}
