//! 运行选项

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 激活模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// 评估所有规则
    #[default]
    All,
    /// 第一条匹配的规则执行后停止
    First,
}

/// 效果对象的提交方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectsMode {
    /// 所有规则共享同一个效果对象
    Mutable,
    /// 每条规则在副本上执行，动作成功后才提交
    #[default]
    Immutable,
}

/// 动作返回补丁的合并策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// 顶层字段逐个覆盖
    #[default]
    Assign,
    /// 对象递归合并，其他值（包括数组）整体覆盖
    Deep,
}

/// 单次运行的配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub activation: Activation,
    pub effects_mode: EffectsMode,
    pub merge_strategy: MergeStrategy,
    pub rollback_on_error: bool,
    /// 非空时只运行标签与之相交的规则
    pub include_tags: BTreeSet<String>,
    /// 跳过标签与之相交的规则
    pub exclude_tags: BTreeSet<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn effects_mode(mut self, mode: EffectsMode) -> Self {
        self.effects_mode = mode;
        self
    }

    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    pub fn rollback_on_error(mut self, rollback: bool) -> Self {
        self.rollback_on_error = rollback;
        self
    }

    pub fn include_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_tags = tags.into_iter().map(Into::into).collect();
        self
    }
}
