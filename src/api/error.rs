// ==========================================
// 农场配额追踪 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换存储层/领域层错误为用户可读的错误消息
// ==========================================

use crate::api::validator::ValidationFailure;
use crate::domain::types::DomainError;
use crate::i18n::t_with_args;
use crate::repository::error::RepositoryError;
use std::fmt;
use thiserror::Error;

// ==========================================
// CloseStage - 关闭周期的执行阶段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStage {
    /// 追加历史记录
    AppendHistory,
    /// 重置台账
    ResetLedger,
}

impl fmt::Display for CloseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseStage::AppendHistory => write!(f, "APPEND_HISTORY"),
            CloseStage::ResetLedger => write!(f, "RESET_LEDGER"),
        }
    }
}

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误 (不产生任何修改)
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(ValidationFailure),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("需要确认: id={id}")]
    ConfirmationRequired { id: String },

    // ==========================================
    // 资源错误
    // ==========================================
    #[error("资源未找到: {entity}(id={id})")]
    NotFound { entity: String, id: String },

    #[error("资源冲突: {0}")]
    Conflict(String),

    // ==========================================
    // 关闭周期
    // ==========================================
    /// 可安全重试 (历史记录 id 由周期序号决定)
    #[error("关闭周期失败: stage={stage}, {message}")]
    CycleCloseFailed { stage: CloseStage, message: String },

    // ==========================================
    // 存储/配置错误
    // ==========================================
    #[error("远端存储错误: {0}")]
    RemoteError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 本地化的用户提示
    pub fn user_message(&self) -> String {
        match self {
            ApiError::ValidationError(failure) => {
                t_with_args("error.validation", &[("detail", &failure.user_message())])
            }
            ApiError::InvalidInput(detail) => t_with_args("error.invalid_input", &[("detail", detail)]),
            ApiError::ConfirmationRequired { id } => {
                t_with_args("error.confirmation_required", &[("id", id)])
            }
            ApiError::NotFound { entity, id } => {
                t_with_args("error.not_found", &[("entity", entity), ("id", id)])
            }
            ApiError::Conflict(detail) | ApiError::RemoteError(detail) => {
                t_with_args("error.remote", &[("detail", detail)])
            }
            ApiError::CycleCloseFailed { stage, message } => t_with_args(
                "archive.close_failed",
                &[("stage", &stage.to_string()), ("detail", message)],
            ),
            ApiError::ConfigError(detail) => t_with_args("error.config", &[("detail", detail)]),
            ApiError::InternalError(detail) => t_with_args("error.internal", &[("detail", detail)]),
            ApiError::Other(err) => t_with_args("error.internal", &[("detail", &err.to_string())]),
        }
    }

    /// 是否为输入校验类错误
    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::ValidationError(_))
    }

    pub(crate) fn close_failed(stage: CloseStage, err: impl fmt::Display) -> Self {
        ApiError::CycleCloseFailed {
            stage,
            message: err.to_string(),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => ApiError::NotFound { entity, id },
            RepositoryError::Conflict { entity, id } => {
                ApiError::Conflict(format!("{}(id={})已存在", entity, id))
            }
            RepositoryError::SchemaMismatch { key, message } => {
                ApiError::RemoteError(format!("文档{}格式不符: {}", key, message))
            }
            RepositoryError::Unavailable(msg) => ApiError::RemoteError(msg),
            RepositoryError::SubscriptionClosed(key) => {
                ApiError::RemoteError(format!("订阅已关闭: {}", key))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::RemoteError(msg),
            RepositoryError::LockError(msg) => ApiError::InternalError(format!("锁获取失败: {}", msg)),
            RepositoryError::Serialization(err) => ApiError::InternalError(err.to_string()),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 DomainError 转换
// ==========================================
impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidQuantity { raw } => {
                ApiError::ValidationError(ValidationFailure::InvalidQuantity { raw })
            }
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
