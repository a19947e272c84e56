//! 决策引擎集成测试
//!
//! 覆盖规则组装、执行顺序、效果合并、回滚、追踪与注册表的完整工作流。

use decision_engine::{
    Activation, Condition, EffectsMode, EngineError, MergeStrategy, OperatorRegistry, RuleBuilder,
    RuleTrace, RulesetBuilder, RulesetRegistry, RunOptions, SkipReason, Snapshot, field,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn rule(id: &str) -> RuleBuilder<Value, Value> {
    RuleBuilder::new(id)
}

fn ruleset(name: &str) -> RulesetBuilder<Value, Value> {
    RulesetBuilder::new(name).default_effects(|| json!({}))
}

/// 去掉耗时字段，便于比较两次运行的追踪
fn without_durations(trace: &[RuleTrace]) -> Vec<RuleTrace> {
    trace
        .iter()
        .cloned()
        .map(|mut t| {
            t.duration_ms = None;
            t
        })
        .collect()
}

// ============================================================================
// 执行顺序
// ============================================================================

#[test]
fn test_compiled_order_is_priority_desc_then_declared() {
    let priorities = [3, 7, 3, 7, 0, -2, 3, 12];
    let mut builder = ruleset("ordering");
    for (i, priority) in priorities.iter().enumerate() {
        builder = builder
            .rule(rule(&format!("r{}", i)).priority(*priority).then(|_| Ok(None)))
            .unwrap();
    }
    let engine = builder.compile().unwrap();

    let declared: Vec<(String, i64)> = priorities
        .iter()
        .enumerate()
        .map(|(i, p)| (format!("r{}", i), *p))
        .collect();
    let position = |id: &str| declared.iter().position(|(d, _)| d == id).unwrap();

    let rules = engine.rules();
    for i in 0..rules.len() {
        for j in (i + 1)..rules.len() {
            let (a, b) = (&rules[i], &rules[j]);
            assert!(
                a.priority() > b.priority()
                    || (a.priority() == b.priority() && position(a.id()) < position(b.id())),
                "{} 应排在 {} 之前",
                a.id(),
                b.id()
            );
        }
    }

    // 多次运行的执行顺序不变
    let first = engine.run(&json!({})).unwrap().fired;
    let second = engine.run(&json!({})).unwrap().fired;
    assert_eq!(first, second);
    assert_eq!(first[0], "r7");
}

#[test]
fn test_two_rules_fire_high_then_low() {
    let engine = ruleset("pair")
        .rule(rule("low").priority(10).then(|mut ctx| {
            let mut log = ctx.effects["log"].as_array().cloned().unwrap_or_default();
            log.push(json!("low"));
            ctx.note("low applied");
            Ok(Some(json!({"log": log})))
        }))
        .unwrap()
        .rule(rule("high").priority(100).then(|_| Ok(Some(json!({"log": ["high"]})))))
        .unwrap()
        .compile()
        .unwrap();

    let result = engine.run(&json!({})).unwrap();
    assert_eq!(result.fired, vec!["high", "low"]);
    assert_eq!(result.effects, json!({"log": ["high", "low"]}));
    assert_eq!(result.rule_trace("low").unwrap().notes, vec!["low applied"]);
}

// ============================================================================
// 条件求值
// ============================================================================

#[test]
fn test_rule_conditions_short_circuit_but_composites_do_not() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = |label: &str, result: bool| {
        let calls = calls.clone();
        Condition::atomic(label, move |_: &Value| {
            calls.fetch_add(1, Ordering::SeqCst);
            result
        })
    };

    let engine = ruleset("discipline")
        .rule(
            rule("composite")
                .priority(10)
                .when(Condition::and(vec![
                    counted("a", false),
                    counted("b", true),
                    counted("c", true),
                ]))
                .then(|_| Ok(None)),
        )
        .unwrap()
        .rule(
            rule("list")
                .when(counted("x", false))
                .when(counted("y", true))
                .when(counted("z", true))
                .then(|_| Ok(None)),
        )
        .unwrap()
        .compile()
        .unwrap();

    let result = engine.run(&json!({})).unwrap();
    // AND 评估全部 3 个子条件，规则级列表只评估到第一个 false
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let composite = result.rule_trace("composite").unwrap();
    assert_eq!(composite.conditions[0].children.len(), 3);
    assert_eq!(composite.conditions[0].left, Some(json!(["a", "b", "c"])));

    let list = result.rule_trace("list").unwrap();
    assert_eq!(list.conditions.len(), 1);
    assert!(result.fired.is_empty());
}

#[test]
fn test_or_and_not_traces() {
    let facts = json!({"user": {"tier": "silver", "banned": false}});
    let or = Condition::or(vec![
        field("user.tier").eq("gold"),
        field("user.tier").eq("silver"),
        field("user.tier").eq("bronze"),
    ]);
    let trace = or.evaluate(&facts);
    assert!(trace.result);
    assert_eq!(trace.children.len(), 3);

    let not = Condition::not(field("user.banned").flag().is_true());
    let trace = not.evaluate(&facts);
    assert!(trace.result);
    assert_eq!(trace.children.len(), 1);
    assert_eq!(trace.label, "NOT(user.banned == true)");

    assert!(Condition::<Value>::and(vec![]).evaluate(&facts).result);
    assert!(!Condition::<Value>::or(vec![]).evaluate(&facts).result);
}

#[test]
fn test_adult_scenario_trace() {
    let engine = ruleset("kyc")
        .rule(
            rule("adult")
                .reason_code("AGE_18")
                .when(field("age").number().gte(18))
                .then(|_| Ok(Some(json!({"adult": true})))),
        )
        .unwrap()
        .compile()
        .unwrap();

    let result = engine.run(&json!({"age": 20})).unwrap();
    let trace = result.rule_trace("adult").unwrap();
    assert!(trace.matched);
    assert_eq!(
        trace.meta.as_ref().unwrap().reason_code.as_deref(),
        Some("AGE_18")
    );

    let condition = &trace.conditions[0];
    assert!(condition.result);
    assert_eq!(condition.left, Some(json!(20)));
    assert_eq!(condition.op.as_deref(), Some(">="));
    assert_eq!(condition.right, Some(json!(18)));

    let explain = result.explain();
    assert!(explain.contains("rule adult: MATCHED [AGE_18]"));
    assert!(explain.contains("✓ age >= 18 [20 >= 18]"));
}

#[test]
fn test_broken_paths_are_false_not_errors() {
    let engine = ruleset("paths")
        .rule(
            rule("deep")
                .when(field("a.b.c").number().gt(1))
                .then(|_| Ok(None)),
        )
        .unwrap()
        .rule(
            rule("contains")
                .when(field("count").list().contains(1))
                .then(|_| Ok(None)),
        )
        .unwrap()
        .compile()
        .unwrap();

    let result = engine.run(&json!({"a": 5, "count": 3})).unwrap();
    assert!(result.fired.is_empty());
    let deep = result.rule_trace("deep").unwrap();
    assert_eq!(deep.conditions[0].left, Some(Value::Null));
}

// ============================================================================
// 效果与回滚
// ============================================================================

#[test]
fn test_rollback_scenario() {
    let engine = ruleset("rollback")
        .rule(rule("first").priority(2).then(|_| anyhow::bail!("下游超时")))
        .unwrap()
        .rule(rule("second").priority(1).then(|_| Ok(Some(json!({"second": true})))))
        .unwrap()
        .compile()
        .unwrap();

    let options = RunOptions::new().rollback_on_error(true);
    let result = engine.run_with(&json!({}), &options).unwrap();

    assert_eq!(result.fired, vec!["first", "second"]);
    assert_eq!(result.effects, json!({"second": true}));
    let first = result.rule_trace("first").unwrap();
    assert_eq!(first.error.as_deref(), Some("下游超时"));
    assert!(result.explain().contains("error: 下游超时"));

    // 未开启回滚时整个运行失败
    let err = engine.run(&json!({})).unwrap_err();
    assert_eq!(err.code(), "RULE_ACTION_ERROR");
}

#[test]
fn test_deep_merge_scenario() {
    let engine = RulesetBuilder::<Value, Value>::new("merge")
        .default_effects(|| json!({"stats": {"count": 0}, "fired": []}))
        .rule(rule("count").then(|_| Ok(Some(json!({"stats": {"count": 2}})))))
        .unwrap()
        .compile()
        .unwrap();

    let deep = RunOptions::new().merge_strategy(MergeStrategy::Deep);
    let result = engine.run_with(&json!({}), &deep).unwrap();
    assert_eq!(result.effects, json!({"stats": {"count": 2}, "fired": []}));
}

#[test]
fn test_immutable_runs_are_idempotent() {
    let engine = ruleset("idempotent")
        .rule(
            rule("vip")
                .priority(5)
                .when(field("tier").eq("gold"))
                .then(|_| Ok(Some(json!({"discount": 0.1})))),
        )
        .unwrap()
        .rule(
            rule("large")
                .when(field("amount").number().gte(1000))
                .then(|_| Ok(Some(json!({"review": true})))),
        )
        .unwrap()
        .compile()
        .unwrap();

    let facts = json!({"tier": "gold", "amount": 1500});
    let options = RunOptions::new().effects_mode(EffectsMode::Immutable);
    let a = engine.run_with(&facts, &options).unwrap();
    let b = engine.run_with(&facts, &options).unwrap();

    assert_eq!(a.effects, b.effects);
    assert_eq!(a.fired, b.fired);
    assert_eq!(without_durations(&a.trace), without_durations(&b.trace));
}

#[test]
fn test_mutable_mode_shares_effects() {
    let engine = ruleset("mutable")
        .rule(rule("a").priority(2).then(|mut ctx| {
            ctx.effects["total"] = json!(1);
            Ok(None)
        }))
        .unwrap()
        .rule(rule("b").priority(1).then(|mut ctx| {
            let total = ctx.effects["total"].as_i64().unwrap_or(0);
            ctx.effects["total"] = json!(total + 1);
            Ok(None)
        }))
        .unwrap()
        .compile()
        .unwrap();

    let options = RunOptions::new().effects_mode(EffectsMode::Mutable);
    let result = engine.run_with(&json!({}), &options).unwrap();
    assert_eq!(result.effects, json!({"total": 2}));
}

#[test]
fn test_activation_first_and_tag_filters() {
    let engine = ruleset("activation")
        .rule(rule("beta").priority(3).tags(["beta"]).then(|_| Ok(None)))
        .unwrap()
        .rule(rule("core").priority(2).tags(["core"]).then(|_| Ok(None)))
        .unwrap()
        .rule(rule("tail").priority(1).tags(["core"]).then(|_| Ok(None)))
        .unwrap()
        .compile()
        .unwrap();

    let options = RunOptions::new()
        .activation(Activation::First)
        .exclude_tags(["beta"]);
    let result = engine.run_with(&json!({}), &options).unwrap();

    assert_eq!(result.fired, vec!["core"]);
    assert_eq!(
        result.rule_trace("beta").unwrap().skipped_reason,
        Some(SkipReason::TagExcluded)
    );
    assert!(result.rule_trace("tail").is_none());
    assert!(result.explain().contains("rule beta: SKIPPED (tag-excluded)"));
}

// ============================================================================
// 强类型事实与效果
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Applicant {
    name: String,
    age: u32,
    country: String,
    documents: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Decision {
    approved: bool,
    reasons: Vec<String>,
    limit: u32,
}

#[test]
fn test_typed_snapshot_and_effects() {
    let engine = RulesetBuilder::<Snapshot<Applicant>, Decision>::new("kyc")
        .default_effects(Decision::default)
        .rule(
            RuleBuilder::<Snapshot<Applicant>, Decision>::new("adult-resident")
                .priority(10)
                .when(field("age").number().gte(18))
                .when(field("country").is_in(["DE", "FR"]))
                .when(Condition::atomic("has passport", |a: &Snapshot<Applicant>| {
                    a.documents.iter().any(|d| d == "passport")
                }))
                .then(|mut ctx| {
                    ctx.effects.approved = true;
                    ctx.effects.reasons.push(format!("{} verified", ctx.facts.name));
                    Ok(None)
                }),
        )
        .unwrap()
        .rule(
            RuleBuilder::<Snapshot<Applicant>, Decision>::new("limit")
                .when(field("documents").list().any("has utility bill", |d| d == "utility_bill"))
                .then(|_| Ok(Some(json!({"limit": 5000})))),
        )
        .unwrap()
        .compile()
        .unwrap();

    let applicant = Snapshot::new(Applicant {
        name: "Ana".to_string(),
        age: 31,
        country: "DE".to_string(),
        documents: vec!["passport".to_string(), "utility_bill".to_string()],
    })
    .unwrap();

    let result = engine.run(&applicant).unwrap();
    assert_eq!(
        result.effects,
        Decision {
            approved: true,
            reasons: vec!["Ana verified".to_string()],
            limit: 5000,
        }
    );
    assert_eq!(result.fired, vec!["adult-resident", "limit"]);
}

// ============================================================================
// 命名操作符与注册表
// ============================================================================

#[test]
fn test_named_operators_feed_rules() {
    let operators = OperatorRegistry::<Value>::with_field_operators();
    operators
        .register("is_weekend", |args: &[Value]| {
            let path = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::OperatorArguments {
                    operator: "is_weekend".to_string(),
                    reason: "缺少路径".to_string(),
                })?;
            Ok(field(path).is_in(["sat", "sun"]).labeled(format!("{} is weekend", path)))
        })
        .unwrap();

    assert!(matches!(
        operators.register("is_weekend", |_: &[Value]| Ok(Condition::atomic("x", |_: &Value| true))),
        Err(EngineError::OperatorRegistration(_))
    ));

    let engine = ruleset("ops")
        .rule(
            rule("weekend-vip")
                .when(operators.create("is_weekend", &[json!("day")]).unwrap())
                .when(operators.create("eq", &[json!("tier"), json!("gold")]).unwrap())
                .then(|_| Ok(Some(json!({"bonus": true})))),
        )
        .unwrap()
        .compile()
        .unwrap();

    let result = engine.run(&json!({"day": "sun", "tier": "gold"})).unwrap();
    assert_eq!(result.effects, json!({"bonus": true}));
    assert_eq!(
        result.rule_trace("weekend-vip").unwrap().conditions[0].label,
        "day is weekend"
    );

    assert!(matches!(
        operators.create("nope", &[]),
        Err(EngineError::OperatorLookup(_))
    ));
}

#[test]
fn test_registry_records_runs() {
    let registry = RulesetRegistry::new();
    let engine = ruleset("pricing")
        .recorder(Arc::new(registry.clone()))
        .rule(
            rule("vip")
                .tags(["pricing"])
                .when(field("tier").eq("gold"))
                .then(|_| Ok(Some(json!({"discount": 10})))),
        )
        .unwrap()
        .compile()
        .unwrap();
    registry.register(engine.describe());

    engine.run(&json!({"tier": "gold"})).unwrap();
    engine.run(&json!({"tier": "silver"})).unwrap();

    assert_eq!(registry.list_ids(), vec!["pricing"]);
    let history = registry.history("pricing");
    assert_eq!(history.len(), 2);
    assert!(history[0].fired.is_empty());
    assert_eq!(history[1].fired, vec!["vip"]);
    assert_eq!(history[1].facts, json!({"tier": "gold"}));

    let description = registry.get("pricing").unwrap();
    let serialized = serde_json::to_value(&description).unwrap();
    assert_eq!(serialized["rules"][0]["conditions"][0]["label"], "tier == \"gold\"");
    assert_eq!(serialized["rules"][0]["meta"]["tags"], json!(["pricing"]));
}

#[test]
fn test_run_result_serializes() {
    let engine = ruleset("serialize")
        .rule(
            rule("adult")
                .when(field("age").number().gte(18))
                .then(|_| Ok(None)),
        )
        .unwrap()
        .compile()
        .unwrap();

    let result = engine.run(&json!({"age": 16})).unwrap();
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["fired"], json!([]));
    assert_eq!(value["trace"][0]["matched"], json!(false));
    assert_eq!(value["trace"][0]["conditions"][0]["left"], json!(16));
}
