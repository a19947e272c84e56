//! 条件操作符定义与命名操作符注册表

use crate::condition::Condition;
use crate::error::{EngineError, Result};
use crate::facts::FactSource;
use crate::field::{compare, field};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 字段条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 通用比较
    Eq,
    In,

    // 数值比较
    Gt,
    Gte,
    Lt,
    Lte,
    Between,

    // 字符串操作
    Contains,
    StartsWith,
    Matches,

    // 布尔
    IsTrue,
    IsFalse,

    // 时间操作
    Before,
    After,

    // 序列谓词
    Any,
    All,
}

impl Operator {
    /// 标签和追踪中使用的符号
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq | Self::IsTrue | Self::IsFalse => "==",
            Self::In => "in",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Between => "between",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Matches => "matches",
            Self::Before => "before",
            Self::After => "after",
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::In => "in",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Between => "between",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Matches => "matches",
            Self::IsTrue => "is_true",
            Self::IsFalse => "is_false",
            Self::Before => "before",
            Self::After => "after",
            Self::Any => "any",
            Self::All => "all",
        };
        write!(f, "{}", s)
    }
}

/// 命名操作符工厂：根据参数生成条件
pub type OperatorFactory<F> = Arc<dyn Fn(&[Value]) -> Result<Condition<F>> + Send + Sync>;

/// 命名操作符注册表
///
/// 线程安全，可在多个规则集之间共享。重复注册和查找未注册的名称都会返回错误。
pub struct OperatorRegistry<F> {
    factories: DashMap<String, OperatorFactory<F>>,
}

impl<F> Default for OperatorRegistry<F> {
    fn default() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }
}

impl<F: 'static> OperatorRegistry<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册操作符工厂
    pub fn register<B>(&self, name: impl Into<String>, factory: B) -> Result<()>
    where
        B: Fn(&[Value]) -> Result<Condition<F>> + Send + Sync + 'static,
    {
        let name = name.into();
        match self.factories.entry(name) {
            Entry::Occupied(entry) => Err(EngineError::OperatorRegistration(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(factory));
                Ok(())
            }
        }
    }

    /// 使用已注册的操作符创建条件
    pub fn create(&self, name: &str, args: &[Value]) -> Result<Condition<F>> {
        let factory = self
            .factories
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| EngineError::OperatorLookup(name.to_string()))?;

        factory(args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 获取所有已注册的操作符名称（已排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl<F: FactSource + 'static> OperatorRegistry<F> {
    /// 预注册字段操作符，参数格式为 `[path, args...]`
    pub fn with_field_operators() -> Self {
        let registry = Self::new();

        registry.install(Operator::Eq, |args| {
            let (path, rest) = split_args(Operator::Eq, args, 1)?;
            Ok(field::<F>(path).eq(rest[0].clone()))
        });
        registry.install(Operator::In, |args| {
            let (path, rest) = split_args(Operator::In, args, 1)?;
            let candidates = rest[0]
                .as_array()
                .cloned()
                .ok_or_else(|| invalid(Operator::In, "需要数组参数"))?;
            Ok(field::<F>(path).is_in(candidates))
        });
        registry.install(Operator::Gt, |args| numeric(Operator::Gt, args));
        registry.install(Operator::Gte, |args| numeric(Operator::Gte, args));
        registry.install(Operator::Lt, |args| numeric(Operator::Lt, args));
        registry.install(Operator::Lte, |args| numeric(Operator::Lte, args));
        registry.install(Operator::Between, |args| {
            let (path, rest) = split_args(Operator::Between, args, 2)?;
            let min = number_arg(Operator::Between, &rest[0])?;
            let max = number_arg(Operator::Between, &rest[1])?;
            Ok(field::<F>(path).number().between(min, max))
        });
        registry.install(Operator::Contains, |args| {
            let (path, rest) = split_args(Operator::Contains, args, 1)?;
            Ok(field::<F>(path).list().contains(rest[0].clone()))
        });
        registry.install(Operator::StartsWith, |args| {
            let (path, rest) = split_args(Operator::StartsWith, args, 1)?;
            let prefix = string_arg(Operator::StartsWith, &rest[0])?;
            Ok(field::<F>(path).text().starts_with(prefix))
        });
        registry.install(Operator::Matches, |args| {
            let (path, rest) = split_args(Operator::Matches, args, 1)?;
            let pattern = string_arg(Operator::Matches, &rest[0])?;
            let regex = Regex::new(pattern).map_err(|e| {
                invalid(
                    Operator::Matches,
                    &format!("无效的正则表达式 '{}': {}", pattern, e),
                )
            })?;
            Ok(field::<F>(path).text().matches(regex))
        });
        registry.install(Operator::IsTrue, |args| {
            let (path, _) = split_args(Operator::IsTrue, args, 0)?;
            Ok(field::<F>(path).flag().is_true())
        });
        registry.install(Operator::IsFalse, |args| {
            let (path, _) = split_args(Operator::IsFalse, args, 0)?;
            Ok(field::<F>(path).flag().is_false())
        });
        registry.install(Operator::Before, |args| temporal(Operator::Before, args));
        registry.install(Operator::After, |args| temporal(Operator::After, args));

        registry
    }

    fn install<B>(&self, op: Operator, factory: B)
    where
        B: Fn(&[Value]) -> Result<Condition<F>> + Send + Sync + 'static,
    {
        self.factories.insert(op.to_string(), Arc::new(factory));
    }
}

fn split_args(op: Operator, args: &[Value], arity: usize) -> Result<(&str, &[Value])> {
    let (path, rest) = args
        .split_first()
        .ok_or_else(|| invalid(op, "缺少字段路径参数"))?;
    let path = path
        .as_str()
        .ok_or_else(|| invalid(op, "字段路径必须是字符串"))?;

    if rest.len() != arity {
        return Err(invalid(
            op,
            &format!("需要 {} 个值参数，实际 {} 个", arity, rest.len()),
        ));
    }

    Ok((path, rest))
}

fn numeric<F: FactSource + 'static>(op: Operator, args: &[Value]) -> Result<Condition<F>> {
    let (path, rest) = split_args(op, args, 1)?;
    let value = number_arg(op, &rest[0])?;
    let number = field(path).number();

    Ok(match op {
        Operator::Gt => number.gt(value),
        Operator::Gte => number.gte(value),
        Operator::Lt => number.lt(value),
        _ => number.lte(value),
    })
}

fn temporal<F: FactSource + 'static>(op: Operator, args: &[Value]) -> Result<Condition<F>> {
    let (path, rest) = split_args(op, args, 1)?;
    let instant = compare::parse_datetime(&rest[0])
        .ok_or_else(|| invalid(op, &format!("无法解析日期时间: {}", rest[0])))?;
    let time = field(path).time();

    Ok(match op {
        Operator::Before => time.before(instant),
        _ => time.after(instant),
    })
}

/// 保留整数形式，避免标签中出现 18.0
fn number_arg(op: Operator, value: &Value) -> Result<NumberArg> {
    if let Some(i) = value.as_i64() {
        Ok(NumberArg::Int(i))
    } else if let Some(f) = value.as_f64() {
        Ok(NumberArg::Float(f))
    } else {
        Err(invalid(op, &format!("需要数值参数，实际为 {}", value)))
    }
}

fn string_arg(op: Operator, value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| invalid(op, &format!("需要字符串参数，实际为 {}", value)))
}

fn invalid(op: Operator, reason: &str) -> EngineError {
    EngineError::OperatorArguments {
        operator: op.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
enum NumberArg {
    Int(i64),
    Float(f64),
}

impl From<NumberArg> for Value {
    fn from(arg: NumberArg) -> Self {
        match arg {
            NumberArg::Int(i) => Value::from(i),
            NumberArg::Float(f) => Value::from(f),
        }
    }
}

impl crate::field::Number for NumberArg {}
