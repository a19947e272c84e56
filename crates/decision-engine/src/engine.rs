//! 规则集执行
//!
//! 编译后的规则顺序在引擎生命周期内固定不变，引擎可以被任意多个并发运行共享；
//! 每次运行独占自己的效果对象和追踪列表。
//!
//! 同步与异步入口共用同一个执行循环 [`Engine::execute`]，区别只在于
//! [`Dispatch`] 策略：同步入口拒绝异步动作，异步入口逐条等待动作完成。

use crate::condition::{Condition, ConditionTrace};
use crate::error::{EngineError, Result, ValidationTarget};
use crate::merge;
use crate::options::{Activation, EffectsMode, MergeStrategy, RunOptions};
use crate::registry::{RuleDescription, RulesetDescription, RunRecorder};
use crate::rule::{Action, ActionContext, Rule};
use crate::telemetry::{ActiveSpan, SpanAttributes, SpanKind, Telemetry};
use crate::trace::{RuleTrace, RunResult, SkipReason};
use crate::validation::Validator;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub(crate) type EffectsFactory<E> = Arc<dyn Fn() -> E + Send + Sync>;

pub(crate) struct EngineInner<F, E> {
    pub(crate) name: String,
    /// 已按 (priority desc, order asc) 排序
    pub(crate) rules: Vec<Rule<F, E>>,
    pub(crate) default_effects: EffectsFactory<E>,
    pub(crate) facts_validator: Option<Validator<F>>,
    pub(crate) effects_validator: Option<Validator<E>>,
    pub(crate) telemetry: Option<Arc<dyn Telemetry>>,
    pub(crate) recorder: Option<Arc<dyn RunRecorder<F>>>,
    pub(crate) options: RunOptions,
}

/// 已编译的规则集
pub struct Engine<F, E> {
    inner: Arc<EngineInner<F, E>>,
}

impl<F, E> Clone for Engine<F, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, E> fmt::Debug for Engine<F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.inner.name)
            .field("rules", &self.inner.rules)
            .field("options", &self.inner.options)
            .finish()
    }
}

/// 动作调度策略
pub(crate) trait Dispatch {
    /// 动作执行之前检查是否允许调用
    fn admit<F, E>(&self, rule: &Rule<F, E>) -> Result<()>;
}

/// 同步调度：遇到异步动作直接报错，不会等待
pub(crate) struct Blocking;

impl Dispatch for Blocking {
    fn admit<F, E>(&self, rule: &Rule<F, E>) -> Result<()> {
        if rule.action.is_async() {
            return Err(EngineError::AsyncActionMisuse {
                rule_id: rule.id.clone(),
            });
        }
        Ok(())
    }
}

/// 异步调度：逐条等待动作完成后再评估下一条规则
pub(crate) struct Suspending;

impl Dispatch for Suspending {
    fn admit<F, E>(&self, _rule: &Rule<F, E>) -> Result<()> {
        Ok(())
    }
}

impl<F, E> Engine<F, E> {
    pub(crate) fn new(inner: EngineInner<F, E>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// 规则集名称
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 按执行顺序排列的规则
    pub fn rules(&self) -> &[Rule<F, E>] {
        &self.inner.rules
    }

    /// 默认运行选项
    pub fn options(&self) -> &RunOptions {
        &self.inner.options
    }

    /// 生成规则集结构描述
    pub fn describe(&self) -> RulesetDescription {
        RulesetDescription {
            name: self.inner.name.clone(),
            rules: self
                .inner
                .rules
                .iter()
                .map(|rule| RuleDescription {
                    id: rule.id.clone(),
                    priority: rule.priority,
                    order: rule.order,
                    is_async: rule.action.is_async(),
                    meta: rule.meta.clone(),
                    conditions: rule.conditions.iter().map(Condition::shape).collect(),
                })
                .collect(),
        }
    }

    /// 仅在配置了遥测适配器时构造属性并开启 span
    fn start_span<A>(&self, kind: SpanKind, attributes: A) -> Option<Box<dyn ActiveSpan>>
    where
        A: FnOnce() -> SpanAttributes,
    {
        self.inner
            .telemetry
            .as_ref()
            .map(|telemetry| telemetry.start_span(kind, attributes()))
    }
}

fn finish_span(span: Option<Box<dyn ActiveSpan>>, error: Option<&EngineError>) {
    if let Some(mut span) = span {
        if let Some(error) = error {
            span.record_exception(&error.to_string());
        }
        span.end();
    }
}

/// 计算跳过原因，顺序为 disabled、include 过滤、exclude 过滤
fn skip_reason<F, E>(rule: &Rule<F, E>, options: &RunOptions) -> Option<SkipReason> {
    let meta = rule.meta.as_ref();

    if meta.is_some_and(|m| !m.is_enabled()) {
        return Some(SkipReason::Disabled);
    }

    if !options.include_tags.is_empty()
        && !meta.is_some_and(|m| m.has_any_tag(&options.include_tags))
    {
        return Some(SkipReason::TagFiltered);
    }

    if !options.exclude_tags.is_empty()
        && meta.is_some_and(|m| m.has_any_tag(&options.exclude_tags))
    {
        return Some(SkipReason::TagExcluded);
    }

    None
}

impl<F, E> Engine<F, E>
where
    F: Send + Sync + 'static,
    E: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// 使用默认选项同步运行
    ///
    /// 规则声明了异步动作时返回 [`EngineError::AsyncActionMisuse`]。
    pub fn run(&self, facts: &F) -> Result<RunResult<E>> {
        self.run_with(facts, &self.inner.options)
    }

    /// 使用指定选项同步运行
    pub fn run_with(&self, facts: &F, options: &RunOptions) -> Result<RunResult<E>> {
        // Blocking 调度下没有任何挂起点，block_on 只轮询一次即完成
        futures::executor::block_on(self.execute(facts, options, &Blocking))
    }

    /// 使用默认选项异步运行
    pub async fn run_async(&self, facts: &F) -> Result<RunResult<E>> {
        self.run_async_with(facts, &self.inner.options).await
    }

    /// 使用指定选项异步运行
    pub async fn run_async_with(&self, facts: &F, options: &RunOptions) -> Result<RunResult<E>> {
        self.execute(facts, options, &Suspending).await
    }

    async fn execute<D: Dispatch>(
        &self,
        facts: &F,
        options: &RunOptions,
        dispatch: &D,
    ) -> Result<RunResult<E>> {
        let inner = &*self.inner;
        let span = self.start_span(SpanKind::Run, || SpanAttributes::new(&inner.name));

        let mut fired = Vec::new();
        let mut trace = Vec::with_capacity(inner.rules.len());
        let outcome = self
            .execute_rules(facts, options, dispatch, &mut fired, &mut trace)
            .await;

        // 中止的运行同样上报，附带已评估部分的追踪
        if let Some(recorder) = &inner.recorder {
            recorder.record(&inner.name, &trace, &fired, facts);
        }

        match &outcome {
            Ok(_) => debug!(
                ruleset = %inner.name,
                fired = fired.len(),
                evaluated = trace.len(),
                "规则集运行完成"
            ),
            Err(err) => warn!(
                ruleset = %inner.name,
                evaluated = trace.len(),
                error = %err,
                "规则集运行中止"
            ),
        }

        finish_span(span, outcome.as_ref().err());
        outcome.map(|effects| RunResult {
            effects,
            fired,
            trace,
        })
    }

    async fn execute_rules<D: Dispatch>(
        &self,
        facts: &F,
        options: &RunOptions,
        dispatch: &D,
        fired: &mut Vec<String>,
        trace: &mut Vec<RuleTrace>,
    ) -> Result<E> {
        let inner = &*self.inner;

        if let Some(validate) = &inner.facts_validator {
            validate(facts).map_err(|e| EngineError::Validation {
                target: ValidationTarget::Facts,
                message: format!("{:#}", e),
            })?;
        }

        let mut effects = (inner.default_effects)();
        self.validate_effects(&effects)?;

        for rule in &inner.rules {
            if let Some(reason) = skip_reason(rule, options) {
                debug!(ruleset = %inner.name, rule_id = %rule.id, reason = %reason, "规则已跳过");
                let mut rule_trace = RuleTrace::new(&rule.id, rule.meta.clone());
                rule_trace.skipped_reason = Some(reason);
                trace.push(rule_trace);
                continue;
            }

            let started = Instant::now();
            let span = self.start_span(SpanKind::Rule, || {
                SpanAttributes::new(&inner.name).rule(&rule.id)
            });

            let mut rule_trace = RuleTrace::new(&rule.id, rule.meta.clone());
            rule_trace.matched = self.evaluate_conditions(rule, facts, &mut rule_trace.conditions);

            let mut failure = None;
            if rule_trace.matched {
                fired.push(rule.id.clone());

                if let Err(err) = self
                    .apply_action(rule, facts, &mut effects, options, dispatch, &mut rule_trace)
                    .await
                {
                    if err.is_recoverable() && options.rollback_on_error {
                        warn!(ruleset = %inner.name, rule_id = %rule.id, error = %err, "动作失败，已回滚");
                    } else {
                        failure = Some(err);
                    }
                }
            }

            rule_trace.duration_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
            finish_span(span, failure.as_ref());
            let matched = rule_trace.matched;
            trace.push(rule_trace);

            if let Some(err) = failure {
                return Err(err);
            }

            if matched && options.activation == Activation::First {
                break;
            }
        }

        self.validate_effects(&effects)?;
        Ok(effects)
    }

    /// 顺序短路求值：第一个为 false 的条件之后不再评估
    fn evaluate_conditions(&self, rule: &Rule<F, E>, facts: &F, out: &mut Vec<ConditionTrace>) -> bool {
        for condition in &rule.conditions {
            let span = self.start_span(SpanKind::Condition, || {
                SpanAttributes::new(&self.inner.name)
                    .rule(&rule.id)
                    .condition(condition.label())
            });
            let result = condition.evaluate(facts);
            finish_span(span, None);

            let passed = result.result;
            out.push(result);
            if !passed {
                return false;
            }
        }
        true
    }

    /// 执行动作并按效果模式提交
    ///
    /// 失败时错误写入规则追踪，效果保持为动作执行前的状态
    /// （mutable 模式下仅在开启 rollback_on_error 时恢复）。
    async fn apply_action<D: Dispatch>(
        &self,
        rule: &Rule<F, E>,
        facts: &F,
        effects: &mut E,
        options: &RunOptions,
        dispatch: &D,
        rule_trace: &mut RuleTrace,
    ) -> Result<()> {
        dispatch.admit(rule)?;

        let span = self.start_span(SpanKind::Action, || {
            SpanAttributes::new(&self.inner.name).rule(&rule.id)
        });
        let strategy = options.merge_strategy;

        let outcome = match options.effects_mode {
            EffectsMode::Immutable => {
                let mut working = effects.clone();
                let outcome = invoke(rule, facts, &mut working, strategy, &mut rule_trace.notes).await;
                if outcome.is_ok() {
                    *effects = working;
                }
                outcome
            }
            EffectsMode::Mutable => {
                let checkpoint = options.rollback_on_error.then(|| effects.clone());
                let outcome = invoke(rule, facts, effects, strategy, &mut rule_trace.notes).await;
                if let (Err(_), Some(checkpoint)) = (&outcome, checkpoint) {
                    *effects = checkpoint;
                }
                outcome
            }
        };

        if let Err(err) = &outcome {
            let message = match err {
                EngineError::RuleAction { message, .. } => message.clone(),
                other => other.to_string(),
            };
            rule_trace.notes.push(format!("动作执行失败: {}", message));
            rule_trace.error = Some(message);
        }

        finish_span(span, outcome.as_ref().err());
        outcome
    }

    fn validate_effects(&self, effects: &E) -> Result<()> {
        if let Some(validate) = &self.inner.effects_validator {
            validate(effects).map_err(|e| EngineError::Validation {
                target: ValidationTarget::Effects,
                message: format!("{:#}", e),
            })?;
        }
        Ok(())
    }
}

/// 调用动作并合并返回的补丁
async fn invoke<F, E>(
    rule: &Rule<F, E>,
    facts: &F,
    effects: &mut E,
    strategy: MergeStrategy,
    notes: &mut Vec<String>,
) -> Result<()>
where
    E: Serialize + DeserializeOwned,
{
    let returned = {
        let ctx = ActionContext::new(facts, &mut *effects, notes);
        match &rule.action {
            Action::Sync(action) => action(ctx),
            Action::Async(action) => action(ctx).await,
        }
    };

    let patch = returned.map_err(|e| EngineError::RuleAction {
        rule_id: rule.id.clone(),
        message: format!("{:#}", e),
    })?;

    if let Some(patch) = patch {
        merge::apply_patch(effects, patch, strategy).map_err(|message| EngineError::RuleAction {
            rule_id: rule.id.clone(),
            message,
        })?;
    }

    Ok(())
}
