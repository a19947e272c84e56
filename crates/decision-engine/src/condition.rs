//! 条件节点
//!
//! 条件是对事实数据求值的纯函数，返回布尔结果以及结构化的评估追踪。
//! 条件按值组合（闭包），创建后不可变。
//!
//! 注意：`and` / `or` 组合节点总是评估全部子节点（不短路），
//! 以便追踪中完整记录每个子条件的结果；规则级的条件列表则是短路求值的，
//! 两者的差异是有意保留的。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 单次条件评估的追踪记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTrace {
    pub label: String,
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConditionTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
}

/// 条件节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Atomic,
    And,
    Or,
    Not,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atomic => write!(f, "atomic"),
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
        }
    }
}

/// 比较细节（左值、操作符、右值）
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Value,
    pub op: String,
    pub right: Value,
}

impl Comparison {
    pub fn new(left: impl Into<Value>, op: impl Into<String>, right: impl Into<Value>) -> Self {
        Self {
            left: left.into(),
            op: op.into(),
            right: right.into(),
        }
    }
}

/// 求值闭包的原始输出，标签和原因码由 [`Condition::evaluate`] 统一填充
pub(crate) struct Evaluation {
    result: bool,
    comparison: Option<Comparison>,
    left: Option<Value>,
    op: Option<String>,
    children: Vec<ConditionTrace>,
}

impl Evaluation {
    pub(crate) fn compared(result: bool, comparison: Comparison) -> Self {
        Self {
            result,
            comparison: Some(comparison),
            left: None,
            op: None,
            children: Vec::new(),
        }
    }

    /// 只有左值和操作符，没有右值（如序列谓词）
    pub(crate) fn observed(result: bool, left: Value, op: &str) -> Self {
        Self {
            result,
            comparison: None,
            left: Some(left),
            op: Some(op.to_string()),
            children: Vec::new(),
        }
    }

    fn bare(result: bool) -> Self {
        Self {
            result,
            comparison: None,
            left: None,
            op: None,
            children: Vec::new(),
        }
    }
}

type Evaluator<F> = dyn Fn(&F) -> Evaluation + Send + Sync;

/// 条件的静态结构元数据（用于内省和可视化）
///
/// `children` 保存的是子条件节点本身，而非评估结果。
pub struct ConditionMeta<F> {
    label: String,
    reason_code: Option<String>,
    kind: ConditionKind,
    children: Vec<Condition<F>>,
}

impl<F> ConditionMeta<F> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn reason_code(&self) -> Option<&str> {
        self.reason_code.as_deref()
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    pub fn children(&self) -> &[Condition<F>] {
        &self.children
    }
}

/// 条件节点
pub struct Condition<F> {
    meta: Arc<ConditionMeta<F>>,
    eval: Arc<Evaluator<F>>,
}

impl<F> Clone for Condition<F> {
    fn clone(&self) -> Self {
        Self {
            meta: Arc::clone(&self.meta),
            eval: Arc::clone(&self.eval),
        }
    }
}

impl<F> fmt::Debug for Condition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("label", &self.meta.label)
            .field("kind", &self.meta.kind)
            .field("children", &self.meta.children.len())
            .finish()
    }
}

impl<F: 'static> Condition<F> {
    /// 原子条件：由用户谓词决定结果
    pub fn atomic<P>(label: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&F) -> bool + Send + Sync + 'static,
    {
        Self::from_evaluator(label.into(), ConditionKind::Atomic, Vec::new(), move |facts| {
            Evaluation::bare(predicate(facts))
        })
    }

    /// 带比较细节的原子条件，细节函数提供追踪中的 left / op / right
    pub fn atomic_with<P, D>(label: impl Into<String>, predicate: P, details: D) -> Self
    where
        P: Fn(&F) -> bool + Send + Sync + 'static,
        D: Fn(&F) -> Comparison + Send + Sync + 'static,
    {
        Self::from_evaluator(label.into(), ConditionKind::Atomic, Vec::new(), move |facts| {
            Evaluation::compared(predicate(facts), details(facts))
        })
    }

    pub(crate) fn from_evaluator<E>(
        label: String,
        kind: ConditionKind,
        children: Vec<Condition<F>>,
        eval: E,
    ) -> Self
    where
        E: Fn(&F) -> Evaluation + Send + Sync + 'static,
    {
        Self {
            meta: Arc::new(ConditionMeta {
                label,
                reason_code: None,
                kind,
                children,
            }),
            eval: Arc::new(eval),
        }
    }

    /// 逻辑与：评估全部子条件，空列表为 true
    pub fn and(children: Vec<Condition<F>>) -> Self {
        let label = composite_label("AND", &children);
        Self::composite(label, ConditionKind::And, children)
    }

    /// 逻辑或：评估全部子条件，空列表为 false
    pub fn or(children: Vec<Condition<F>>) -> Self {
        let label = composite_label("OR", &children);
        Self::composite(label, ConditionKind::Or, children)
    }

    /// 逻辑非：追踪中恰好包含一个子节点
    pub fn not(child: Condition<F>) -> Self {
        let label = format!("NOT({})", child.label());
        Self::composite(label, ConditionKind::Not, vec![child])
    }

    fn composite(label: String, kind: ConditionKind, children: Vec<Condition<F>>) -> Self {
        let nodes = children.clone();
        Self::from_evaluator(label, kind, children, move |facts| {
            let traces: Vec<ConditionTrace> = nodes.iter().map(|c| c.evaluate(facts)).collect();
            let result = match kind {
                ConditionKind::And => traces.iter().all(|t| t.result),
                ConditionKind::Or => traces.iter().any(|t| t.result),
                _ => !traces.first().is_some_and(|t| t.result),
            };
            let labels = traces.iter().map(|t| Value::from(t.label.clone())).collect();

            Evaluation {
                result,
                comparison: None,
                left: Some(Value::Array(labels)),
                op: Some(kind.to_string()),
                children: traces,
            }
        })
    }

    /// 使用自定义标签，返回新条件
    pub fn labeled(self, label: impl Into<String>) -> Self {
        let meta = ConditionMeta {
            label: label.into(),
            reason_code: self.meta.reason_code.clone(),
            kind: self.meta.kind,
            children: self.meta.children.clone(),
        };
        Self {
            meta: Arc::new(meta),
            eval: self.eval,
        }
    }

    /// 附加原因码，返回新条件
    pub fn with_reason_code(self, code: impl Into<String>) -> Self {
        let meta = ConditionMeta {
            label: self.meta.label.clone(),
            reason_code: Some(code.into()),
            kind: self.meta.kind,
            children: self.meta.children.clone(),
        };
        Self {
            meta: Arc::new(meta),
            eval: self.eval,
        }
    }
}

impl<F> Condition<F> {
    pub fn label(&self) -> &str {
        &self.meta.label
    }

    pub fn meta(&self) -> &ConditionMeta<F> {
        &self.meta
    }

    /// 对事实求值，每次返回新的追踪记录
    pub fn evaluate(&self, facts: &F) -> ConditionTrace {
        let evaluation = (self.eval)(facts);
        let (left, op, right) = match evaluation.comparison {
            Some(cmp) => (Some(cmp.left), Some(cmp.op), Some(cmp.right)),
            None => (evaluation.left, evaluation.op, None),
        };

        ConditionTrace {
            label: self.meta.label.clone(),
            result: evaluation.result,
            left,
            op,
            right,
            children: evaluation.children,
            reason_code: self.meta.reason_code.clone(),
        }
    }

    /// 生成可序列化的结构树
    pub fn shape(&self) -> ConditionShape {
        ConditionShape {
            label: self.meta.label.clone(),
            kind: self.meta.kind,
            reason_code: self.meta.reason_code.clone(),
            children: self.meta.children.iter().map(Condition::shape).collect(),
        }
    }
}

fn composite_label<F>(op: &str, children: &[Condition<F>]) -> String {
    let labels: Vec<&str> = children.iter().map(Condition::label).collect();
    format!("{}({})", op, labels.join(", "))
}

/// 条件结构树（静态元数据的可序列化形式）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionShape {
    pub label: String,
    pub kind: ConditionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConditionShape>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(label: &str, result: bool, counter: Arc<AtomicUsize>) -> Condition<Value> {
        Condition::atomic(label, move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            result
        })
    }

    #[test]
    fn test_atomic_trace() {
        let cond = Condition::atomic_with(
            "age >= 18",
            |f: &Value| f["age"].as_i64().unwrap_or(0) >= 18,
            |f: &Value| Comparison::new(f["age"].clone(), ">=", 18),
        )
        .with_reason_code("AGE_18");

        let trace = cond.evaluate(&json!({"age": 20}));
        assert!(trace.result);
        assert_eq!(trace.label, "age >= 18");
        assert_eq!(trace.left, Some(json!(20)));
        assert_eq!(trace.op.as_deref(), Some(">="));
        assert_eq!(trace.right, Some(json!(18)));
        assert_eq!(trace.reason_code.as_deref(), Some("AGE_18"));
        assert!(trace.children.is_empty());
    }

    #[test]
    fn test_and_evaluates_every_child() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cond = Condition::and(vec![
            counting("a", false, counter.clone()),
            counting("b", true, counter.clone()),
            counting("c", true, counter.clone()),
        ]);

        let trace = cond.evaluate(&json!({}));
        assert!(!trace.result);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(trace.children.len(), 3);
        assert_eq!(trace.left, Some(json!(["a", "b", "c"])));
        assert_eq!(trace.label, "AND(a, b, c)");
    }

    #[test]
    fn test_or_evaluates_every_child() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cond = Condition::or(vec![
            counting("a", true, counter.clone()),
            counting("b", false, counter.clone()),
        ]);

        let trace = cond.evaluate(&json!({}));
        assert!(trace.result);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(trace.children.len(), 2);
    }

    #[test]
    fn test_empty_composites() {
        assert!(Condition::<Value>::and(vec![]).evaluate(&json!({})).result);
        assert!(!Condition::<Value>::or(vec![]).evaluate(&json!({})).result);
    }

    #[test]
    fn test_not_has_single_child() {
        let cond = Condition::not(Condition::atomic("vip", |_: &Value| true));
        let trace = cond.evaluate(&json!({}));

        assert!(!trace.result);
        assert_eq!(trace.children.len(), 1);
        assert_eq!(trace.label, "NOT(vip)");
        assert_eq!(cond.meta().kind(), ConditionKind::Not);
        assert_eq!(cond.meta().children().len(), 1);
    }

    #[test]
    fn test_labeled_keeps_behaviour() {
        let cond = Condition::or(vec![
            Condition::atomic("x", |_: &Value| false),
            Condition::atomic("y", |_: &Value| true),
        ])
        .labeled("x or y");

        let trace = cond.evaluate(&json!({}));
        assert_eq!(trace.label, "x or y");
        assert!(trace.result);
        assert_eq!(cond.shape().children.len(), 2);
    }

    #[test]
    fn test_traces_are_fresh_per_evaluation() {
        let cond = Condition::atomic("flag", |f: &Value| f["on"] == json!(true));
        let first = cond.evaluate(&json!({"on": true}));
        let second = cond.evaluate(&json!({"on": false}));
        assert!(first.result);
        assert!(!second.result);
    }
}
