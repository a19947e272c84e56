//! 字段访问器
//!
//! 根据点号路径生成原子条件。调用方通过 `number()` / `text()` / `flag()` /
//! `time()` / `list()` 选择路径上的值类型，每种类型只暴露对应的操作符，
//! 通用操作符 `eq` / `is_in` 对所有类型可用。
//!
//! 生成的条件标签由 `<path> <symbol> <value>` 确定性地构成，
//! 相同的条件总是得到相同的标签。

pub(crate) mod compare;

use crate::condition::{Comparison, Condition, ConditionKind, Evaluation};
use crate::facts::FactSource;
use crate::operators::Operator;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// 创建指向 `path` 的字段访问器
pub fn field<F>(path: impl Into<String>) -> Field<F> {
    Field {
        path: Arc::from(path.into()),
        _facts: PhantomData,
    }
}

/// 可用于数值比较的类型
pub trait Number: Into<Value> + Copy {}

macro_rules! impl_number {
    ($($ty:ty),*) => {
        $(impl Number for $ty {})*
    };
}

impl_number!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// 通用字段访问器
pub struct Field<F> {
    path: Arc<str>,
    _facts: PhantomData<fn(&F)>,
}

impl<F> Clone for Field<F> {
    fn clone(&self) -> Self {
        Self {
            path: Arc::clone(&self.path),
            _facts: PhantomData,
        }
    }
}

impl<F> Field<F> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn number(self) -> NumberField<F> {
        NumberField(self)
    }

    pub fn text(self) -> TextField<F> {
        TextField(self)
    }

    pub fn flag(self) -> FlagField<F> {
        FlagField(self)
    }

    pub fn time(self) -> TimeField<F> {
        TimeField(self)
    }

    pub fn list(self) -> ListField<F> {
        ListField(self)
    }
}

impl<F: FactSource + 'static> Field<F> {
    /// 相等
    pub fn eq(&self, value: impl Into<Value>) -> Condition<F> {
        let expected = value.into();
        let rendered = expected.to_string();
        let check = expected.clone();
        self.compare(Operator::Eq, expected, rendered, move |v| compare::eq(v, &check))
    }

    /// 值在候选列表中
    pub fn is_in<V, I>(&self, values: I) -> Condition<F>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let candidates: Vec<Value> = values.into_iter().map(Into::into).collect();
        let expected = Value::Array(candidates.clone());
        let rendered = expected.to_string();
        self.compare(Operator::In, expected, rendered, move |v| {
            compare::in_list(v, &candidates)
        })
    }

    /// 生成比较型原子条件，路径不存在时结果为 false
    fn compare<T>(&self, op: Operator, right: Value, rendered: String, test: T) -> Condition<F>
    where
        T: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let label = format!("{} {} {}", self.path, op.symbol(), rendered);
        let path = Arc::clone(&self.path);

        Condition::from_evaluator(label, ConditionKind::Atomic, Vec::new(), move |facts: &F| {
            let found = facts.lookup(&path);
            let result = found.is_some_and(&test);
            let left = found.cloned().unwrap_or(Value::Null);
            Evaluation::compared(result, Comparison::new(left, op.symbol(), right.clone()))
        })
    }

    /// 生成序列谓词条件（any / all），使用调用方提供的标签
    fn observe<T>(&self, op: Operator, label: String, test: T) -> Condition<F>
    where
        T: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let path = Arc::clone(&self.path);

        Condition::from_evaluator(label, ConditionKind::Atomic, Vec::new(), move |facts: &F| {
            let found = facts.lookup(&path);
            let result = found.is_some_and(&test);
            let left = found.cloned().unwrap_or(Value::Null);
            Evaluation::observed(result, left, op.symbol())
        })
    }
}

/// 数值字段
pub struct NumberField<F>(Field<F>);

impl<F> Deref for NumberField<F> {
    type Target = Field<F>;

    fn deref(&self) -> &Field<F> {
        &self.0
    }
}

impl<F: FactSource + 'static> NumberField<F> {
    pub fn gt<N: Number>(&self, value: N) -> Condition<F> {
        self.ordered(Operator::Gt, value.into(), Ordering::is_gt)
    }

    pub fn gte<N: Number>(&self, value: N) -> Condition<F> {
        self.ordered(Operator::Gte, value.into(), Ordering::is_ge)
    }

    pub fn lt<N: Number>(&self, value: N) -> Condition<F> {
        self.ordered(Operator::Lt, value.into(), Ordering::is_lt)
    }

    pub fn lte<N: Number>(&self, value: N) -> Condition<F> {
        self.ordered(Operator::Lte, value.into(), Ordering::is_le)
    }

    /// 闭区间 [min, max]
    pub fn between<N: Number>(&self, min: N, max: N) -> Condition<F> {
        let (lo, hi): (Value, Value) = (min.into(), max.into());
        let expected = Value::Array(vec![lo.clone(), hi.clone()]);
        let rendered = expected.to_string();
        self.0.compare(Operator::Between, expected, rendered, move |v| {
            compare::between(v, &lo, &hi)
        })
    }

    fn ordered(&self, op: Operator, expected: Value, cmp: fn(Ordering) -> bool) -> Condition<F> {
        let rendered = expected.to_string();
        let check = expected.clone();
        self.0
            .compare(op, expected, rendered, move |v| compare::compare(v, &check, cmp))
    }
}

/// 字符串字段
pub struct TextField<F>(Field<F>);

impl<F> Deref for TextField<F> {
    type Target = Field<F>;

    fn deref(&self) -> &Field<F> {
        &self.0
    }
}

impl<F: FactSource + 'static> TextField<F> {
    /// 子串包含；字段不是字符串或数组时为 false
    pub fn contains(&self, needle: impl Into<String>) -> Condition<F> {
        let expected = Value::String(needle.into());
        let rendered = expected.to_string();
        let check = expected.clone();
        self.0.compare(Operator::Contains, expected, rendered, move |v| {
            compare::contains(v, &check)
        })
    }

    pub fn starts_with(&self, prefix: impl Into<String>) -> Condition<F> {
        let prefix = prefix.into();
        let expected = Value::String(prefix.clone());
        let rendered = expected.to_string();
        self.0.compare(Operator::StartsWith, expected, rendered, move |v| {
            v.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
        })
    }

    /// 正则匹配，标签中以 `/pattern/` 形式呈现
    pub fn matches(&self, pattern: Regex) -> Condition<F> {
        let expected = Value::String(pattern.as_str().to_string());
        let rendered = format!("/{}/", pattern.as_str());
        self.0.compare(Operator::Matches, expected, rendered, move |v| {
            v.as_str().is_some_and(|s| pattern.is_match(s))
        })
    }
}

/// 布尔字段
pub struct FlagField<F>(Field<F>);

impl<F> Deref for FlagField<F> {
    type Target = Field<F>;

    fn deref(&self) -> &Field<F> {
        &self.0
    }
}

impl<F: FactSource + 'static> FlagField<F> {
    pub fn is_true(&self) -> Condition<F> {
        self.0.compare(Operator::IsTrue, Value::Bool(true), "true".to_string(), |v| {
            v.as_bool() == Some(true)
        })
    }

    pub fn is_false(&self) -> Condition<F> {
        self.0.compare(Operator::IsFalse, Value::Bool(false), "false".to_string(), |v| {
            v.as_bool() == Some(false)
        })
    }
}

/// 时间字段（RFC 3339 或 YYYY-MM-DD 字符串）
pub struct TimeField<F>(Field<F>);

impl<F> Deref for TimeField<F> {
    type Target = Field<F>;

    fn deref(&self) -> &Field<F> {
        &self.0
    }
}

impl<F: FactSource + 'static> TimeField<F> {
    pub fn before(&self, instant: DateTime<Utc>) -> Condition<F> {
        self.temporal(Operator::Before, instant, |a, b| a < b)
    }

    pub fn after(&self, instant: DateTime<Utc>) -> Condition<F> {
        self.temporal(Operator::After, instant, |a, b| a > b)
    }

    fn temporal(
        &self,
        op: Operator,
        instant: DateTime<Utc>,
        cmp: fn(DateTime<Utc>, DateTime<Utc>) -> bool,
    ) -> Condition<F> {
        let expected = Value::String(instant.to_rfc3339_opts(SecondsFormat::Secs, true));
        let rendered = expected.to_string();
        self.0.compare(op, expected, rendered, move |v| {
            compare::time_compare(v, &instant, cmp)
        })
    }
}

/// 序列字段
pub struct ListField<F>(Field<F>);

impl<F> Deref for ListField<F> {
    type Target = Field<F>;

    fn deref(&self) -> &Field<F> {
        &self.0
    }
}

impl<F: FactSource + 'static> ListField<F> {
    /// 元素包含；字段不是数组或字符串时为 false
    pub fn contains(&self, item: impl Into<Value>) -> Condition<F> {
        let expected = item.into();
        let rendered = expected.to_string();
        let check = expected.clone();
        self.0.compare(Operator::Contains, expected, rendered, move |v| {
            compare::contains(v, &check)
        })
    }

    /// 任一元素满足谓词
    pub fn any<P>(&self, label: impl Into<String>, predicate: P) -> Condition<F>
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.0.observe(Operator::Any, label.into(), move |v| {
            v.as_array().is_some_and(|items| items.iter().any(&predicate))
        })
    }

    /// 全部元素满足谓词，空数组为 true
    pub fn all<P>(&self, label: impl Into<String>, predicate: P) -> Condition<F>
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.0.observe(Operator::All, label.into(), move |v| {
            v.as_array().is_some_and(|items| items.iter().all(&predicate))
        })
    }
}
