//! 规则引擎错误类型

use std::fmt;
use thiserror::Error;

/// 校验失败的对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationTarget {
    Facts,
    Effects,
}

impl fmt::Display for ValidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Facts => write!(f, "facts"),
            Self::Effects => write!(f, "effects"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("规则集编译失败: {0}")]
    Compile(String),

    #[error("{target} 校验失败: {message}")]
    Validation {
        target: ValidationTarget,
        message: String,
    },

    #[error("规则 '{rule_id}' 声明了异步动作，不能通过 run() 执行，请改用 run_async()")]
    AsyncActionMisuse { rule_id: String },

    #[error("规则 '{rule_id}' 的动作执行失败: {message}")]
    RuleAction { rule_id: String, message: String },

    #[error("操作符已注册: {0}")]
    OperatorRegistration(String),

    #[error("操作符未注册: {0}")]
    OperatorLookup(String),

    #[error("操作符 {operator} 参数无效: {reason}")]
    OperatorArguments { operator: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Compile(_) => "COMPILE_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::AsyncActionMisuse { .. } => "ASYNC_ACTION_MISUSE",
            Self::RuleAction { .. } => "RULE_ACTION_ERROR",
            Self::OperatorRegistration(_) => "OPERATOR_REGISTRATION_ERROR",
            Self::OperatorLookup(_) => "OPERATOR_LOOKUP_ERROR",
            Self::OperatorArguments { .. } => "OPERATOR_ARGUMENTS_ERROR",
        }
    }

    /// 是否可以通过 rollback_on_error 恢复
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RuleAction { .. })
    }
}
