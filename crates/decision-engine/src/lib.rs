//! 决策引擎
//!
//! 声明一组带优先级的规则，每条规则由可组合的布尔条件守护，
//! 对强类型的事实求值后产出强类型的效果以及可解释的执行追踪。
//!
//! ## 模块结构
//!
//! - `condition`: 条件节点（原子谓词与 AND / OR / NOT 组合）
//! - `field`: 按点分路径生成条件的字段访问器
//! - `operators`: 命名操作符注册表
//! - `rule`: 规则定义与构建器
//! - `ruleset`: 规则集组装与执行顺序编译
//! - `engine`: 同步 / 异步运行循环
//! - `trace` / `explain`: 结构化追踪与可读说明
//! - `registry`: 规则集注册表与运行记录
//! - `telemetry`: span 适配
//! - `validation`: 事实 / 效果校验器
//!
//! ## 示例
//!
//! ```ignore
//! use decision_engine::{RuleBuilder, RulesetBuilder, field};
//! use serde_json::{Value, json};
//!
//! let engine = RulesetBuilder::<Value, Value>::new("kyc")
//!     .default_effects(|| json!({"approved": false}))
//!     .rule(
//!         RuleBuilder::new("adult")
//!             .priority(100)
//!             .reason_code("AGE_18")
//!             .when(field("applicant.age").number().gte(18))
//!             .then(|_| Ok(Some(json!({"approved": true})))),
//!     )?
//!     .compile()?;
//!
//! let result = engine.run(&json!({"applicant": {"age": 20}}))?;
//! println!("{}", result.explain());
//! ```

pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod explain;
pub mod facts;
pub mod field;
pub mod merge;
pub mod operators;
pub mod options;
pub mod registry;
pub mod rule;
pub mod ruleset;
pub mod telemetry;
pub mod trace;
pub mod validation;

pub use condition::{Comparison, Condition, ConditionKind, ConditionMeta, ConditionShape, ConditionTrace};
pub use engine::Engine;
pub use error::{EngineError, Result, ValidationTarget};
pub use facts::{FactSource, Snapshot};
pub use field::{Field, field};
pub use operators::{Operator, OperatorRegistry};
pub use options::{Activation, EffectsMode, MergeStrategy, RunOptions};
pub use registry::{RuleDescription, RulesetDescription, RulesetRegistry, RunRecord, RunRecorder};
pub use rule::{Action, ActionContext, ActionResult, Rule, RuleBuilder, RuleMeta};
pub use ruleset::RulesetBuilder;
pub use telemetry::{ActiveSpan, SpanAttributes, SpanKind, Telemetry, TracingTelemetry};
pub use trace::{RuleTrace, RunResult, SkipReason};
pub use validation::Validator;
