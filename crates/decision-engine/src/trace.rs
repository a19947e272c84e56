//! 运行追踪与运行结果

use crate::condition::ConditionTrace;
use crate::explain;
use crate::rule::RuleMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 规则被跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Disabled,
    TagFiltered,
    TagExcluded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::TagFiltered => write!(f, "tag-filtered"),
            Self::TagExcluded => write!(f, "tag-excluded"),
        }
    }
}

/// 单条规则在一次运行中的追踪记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTrace {
    pub rule_id: String,
    pub matched: bool,
    pub conditions: Vec<ConditionTrace>,
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RuleMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<SkipReason>,
}

impl RuleTrace {
    pub fn new(rule_id: impl Into<String>, meta: Option<RuleMeta>) -> Self {
        Self {
            rule_id: rule_id.into(),
            matched: false,
            conditions: Vec::new(),
            notes: Vec::new(),
            duration_ms: None,
            error: None,
            meta,
            skipped_reason: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped_reason.is_some()
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct RunResult<E> {
    pub effects: E,
    /// 按执行顺序记录的匹配规则 id
    pub fired: Vec<String>,
    pub trace: Vec<RuleTrace>,
}

impl<E> RunResult<E> {
    /// 渲染可读的执行说明（按需生成）
    pub fn explain(&self) -> String {
        explain::render(&self.trace)
    }

    pub fn has_fired(&self, rule_id: &str) -> bool {
        self.fired.iter().any(|id| id == rule_id)
    }

    pub fn rule_trace(&self, rule_id: &str) -> Option<&RuleTrace> {
        self.trace.iter().find(|t| t.rule_id == rule_id)
    }
}
