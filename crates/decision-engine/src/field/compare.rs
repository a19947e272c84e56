//! 值比较工具
//!
//! 字段访问器生成的条件共用的比较逻辑。所有比较在类型不匹配时返回 false，不报错。

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// 相等比较
pub(crate) fn eq(field: &Value, expected: &Value) -> bool {
    // 数值按大小比较，100 与 100.0 相等
    if let (Value::Number(a), Value::Number(b)) = (field, expected) {
        return order(a, b) == Some(Ordering::Equal);
    }

    field == expected
}

/// 数值比较，非数值返回 false
pub(crate) fn compare<C>(field: &Value, expected: &Value, cmp: C) -> bool
where
    C: Fn(Ordering) -> bool,
{
    match (field, expected) {
        (Value::Number(a), Value::Number(b)) => order(a, b).is_some_and(cmp),
        _ => false,
    }
}

/// 闭区间范围比较
pub(crate) fn between(field: &Value, min: &Value, max: &Value) -> bool {
    compare(field, min, Ordering::is_ge) && compare(field, max, Ordering::is_le)
}

/// 两侧都是整数时精确比较，任一侧为浮点数时按 f64 比较
fn order(a: &Number, b: &Number) -> Option<Ordering> {
    match (as_integer(a), as_integer(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// 列表包含检查 (in)
pub(crate) fn in_list(field: &Value, candidates: &[Value]) -> bool {
    candidates.iter().any(|item| eq(field, item))
}

/// 字符串子串或数组元素包含检查，其他类型返回 false
pub(crate) fn contains(field: &Value, expected: &Value) -> bool {
    match field {
        Value::String(s) => expected.as_str().is_some_and(|sub| s.contains(sub)),
        Value::Array(arr) => arr.iter().any(|item| eq(item, expected)),
        _ => false,
    }
}

/// 时间比较
pub(crate) fn time_compare<C>(field: &Value, expected: &DateTime<Utc>, cmp: C) -> bool
where
    C: Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
{
    parse_datetime(field).is_some_and(|t| cmp(t, *expected))
}

/// 解析日期时间（RFC 3339 或 YYYY-MM-DD）
pub(crate) fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
