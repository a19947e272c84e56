//! 规则集组装
//!
//! 收集规则、分配声明顺序，并编译出确定的执行顺序：
//! 优先级降序，同优先级按声明顺序（稳定排序）。

use crate::engine::{EffectsFactory, Engine, EngineInner};
use crate::error::{EngineError, Result};
use crate::options::RunOptions;
use crate::registry::RunRecorder;
use crate::rule::{Rule, RuleBuilder};
use crate::telemetry::Telemetry;
use crate::validation::Validator;
use std::sync::Arc;
use tracing::info;

/// 规则集构建器
pub struct RulesetBuilder<F, E> {
    name: String,
    rules: Vec<Rule<F, E>>,
    next_order: u64,
    default_effects: Option<EffectsFactory<E>>,
    facts_validator: Option<Validator<F>>,
    effects_validator: Option<Validator<E>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    recorder: Option<Arc<dyn RunRecorder<F>>>,
    options: RunOptions,
}

impl<F, E> RulesetBuilder<F, E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            next_order: 0,
            default_effects: None,
            facts_validator: None,
            effects_validator: None,
            telemetry: None,
            recorder: None,
            options: RunOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 每次运行开始时调用，生成初始效果对象（编译前必须设置）
    pub fn default_effects<D>(mut self, factory: D) -> Self
    where
        D: Fn() -> E + Send + Sync + 'static,
    {
        self.default_effects = Some(Arc::new(factory));
        self
    }

    pub fn validate_facts(mut self, validator: Validator<F>) -> Self {
        self.facts_validator = Some(validator);
        self
    }

    pub fn validate_effects(mut self, validator: Validator<E>) -> Self {
        self.effects_validator = Some(validator);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// 运行结果上报钩子（如 [`RulesetRegistry`](crate::registry::RulesetRegistry)）
    pub fn recorder(mut self, recorder: Arc<dyn RunRecorder<F>>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// `run()` / `run_async()` 使用的默认运行选项
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// 定稿并加入一条规则
    ///
    /// 规则未设置动作或 id 重复时返回编译错误。
    pub fn rule(mut self, builder: RuleBuilder<F, E>) -> Result<Self> {
        if self.rules.iter().any(|r| r.id() == builder.id()) {
            return Err(EngineError::Compile(format!(
                "规则集 '{}' 中规则 id 重复: {}",
                self.name,
                builder.id()
            )));
        }

        let rule = builder.finalize(self.next_order)?;
        self.next_order += 1;
        self.rules.push(rule);
        Ok(self)
    }

    /// 批量加入规则，按迭代顺序分配声明顺序
    pub fn rules(self, builders: impl IntoIterator<Item = RuleBuilder<F, E>>) -> Result<Self> {
        builders.into_iter().try_fold(self, |ruleset, builder| ruleset.rule(builder))
    }

    /// 编译规则集
    pub fn compile(self) -> Result<Engine<F, E>> {
        let default_effects = self.default_effects.ok_or_else(|| {
            EngineError::Compile(format!(
                "规则集 '{}' 缺少默认效果: compile() 之前必须调用 default_effects()",
                self.name
            ))
        })?;

        let mut rules = self.rules;
        // sort_by 是稳定排序，同优先级保持声明顺序
        rules.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.order().cmp(&b.order()))
        });

        info!("规则集已编译: {} ({} 条规则)", self.name, rules.len());

        Ok(Engine::new(EngineInner {
            name: self.name,
            rules,
            default_effects,
            facts_validator: self.facts_validator,
            effects_validator: self.effects_validator,
            telemetry: self.telemetry,
            recorder: self.recorder,
            options: self.options,
        }))
    }
}
