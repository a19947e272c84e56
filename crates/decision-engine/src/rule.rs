//! 规则定义
//!
//! 规则由 id、优先级、有序条件列表、元数据和动作组成，
//! 通过 [`RuleBuilder`] 构建，加入规则集后不可再修改。

use crate::condition::Condition;
use crate::error::{EngineError, Result};
use crate::merge::Patch;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// 规则元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl RuleMeta {
    /// 未显式禁用即视为启用
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    pub(crate) fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }
}

/// 动作执行上下文
pub struct ActionContext<'a, F, E> {
    pub facts: &'a F,
    pub effects: &'a mut E,
    notes: &'a mut Vec<String>,
}

impl<'a, F, E> ActionContext<'a, F, E> {
    pub(crate) fn new(facts: &'a F, effects: &'a mut E, notes: &'a mut Vec<String>) -> Self {
        Self {
            facts,
            effects,
            notes,
        }
    }

    /// 记录一条备注到规则追踪
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }
}

/// 动作返回值：可选的部分效果补丁
pub type ActionResult = anyhow::Result<Option<Patch>>;

pub type SyncAction<F, E> = dyn Fn(ActionContext<'_, F, E>) -> ActionResult + Send + Sync;

pub type AsyncAction<F, E> =
    dyn for<'a> Fn(ActionContext<'a, F, E>) -> BoxFuture<'a, ActionResult> + Send + Sync;

/// 规则动作
///
/// 异步动作只能由 `run_async()` 执行，`run()` 遇到时直接报错。
pub enum Action<F, E> {
    Sync(Arc<SyncAction<F, E>>),
    Async(Arc<AsyncAction<F, E>>),
}

impl<F, E> Action<F, E> {
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl<F, E> Clone for Action<F, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// 已定稿的规则
pub struct Rule<F, E> {
    pub(crate) id: String,
    pub(crate) priority: i64,
    pub(crate) order: u64,
    pub(crate) conditions: Vec<Condition<F>>,
    pub(crate) action: Action<F, E>,
    pub(crate) meta: Option<RuleMeta>,
}

impl<F, E> Rule<F, E> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// 声明顺序（同优先级时的排序依据）
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn conditions(&self) -> &[Condition<F>] {
        &self.conditions
    }

    pub fn meta(&self) -> Option<&RuleMeta> {
        self.meta.as_ref()
    }

    pub fn is_async(&self) -> bool {
        self.action.is_async()
    }
}

impl<F, E> fmt::Debug for Rule<F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("order", &self.order)
            .field("conditions", &self.conditions)
            .field("async", &self.is_async())
            .field("meta", &self.meta)
            .finish()
    }
}

/// 规则构建器
pub struct RuleBuilder<F, E> {
    id: String,
    priority: i64,
    conditions: Vec<Condition<F>>,
    action: Option<Action<F, E>>,
    meta: Option<RuleMeta>,
}

impl<F, E> RuleBuilder<F, E> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: 0,
            conditions: Vec::new(),
            action: None,
            meta: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 优先级越高越先执行，默认 0
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// 追加一个条件，条件按追加顺序短路求值
    pub fn when(mut self, condition: Condition<F>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn when_all(mut self, conditions: impl IntoIterator<Item = Condition<F>>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn meta(mut self, meta: RuleMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta_mut().tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta_mut().description = Some(description.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.meta_mut().version = Some(version.into());
        self
    }

    pub fn reason_code(mut self, code: impl Into<String>) -> Self {
        self.meta_mut().reason_code = Some(code.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.meta_mut().enabled = Some(enabled);
        self
    }

    fn meta_mut(&mut self) -> &mut RuleMeta {
        self.meta.get_or_insert_with(RuleMeta::default)
    }

    /// 设置同步动作
    pub fn then<A>(mut self, action: A) -> Self
    where
        A: Fn(ActionContext<'_, F, E>) -> ActionResult + Send + Sync + 'static,
    {
        self.action = Some(Action::Sync(Arc::new(action)));
        self
    }

    /// 设置异步动作
    ///
    /// ```ignore
    /// RuleBuilder::new("notify").then_async(|mut ctx| {
    ///     async move {
    ///         ctx.note("sent");
    ///         Ok(None)
    ///     }
    ///     .boxed()
    /// })
    /// ```
    pub fn then_async<A>(mut self, action: A) -> Self
    where
        A: for<'a> Fn(ActionContext<'a, F, E>) -> BoxFuture<'a, ActionResult> + Send + Sync + 'static,
    {
        self.action = Some(Action::Async(Arc::new(action)));
        self
    }

    /// 定稿规则，未设置动作时返回编译错误
    pub(crate) fn finalize(self, order: u64) -> Result<Rule<F, E>> {
        let action = self.action.ok_or_else(|| {
            EngineError::Compile(format!(
                "规则 '{}' 未设置动作: 加入规则集之前必须调用 then() 或 then_async()",
                self.id
            ))
        })?;

        Ok(Rule {
            id: self.id,
            priority: self.priority,
            order,
            conditions: self.conditions,
            action,
            meta: self.meta,
        })
    }
}
