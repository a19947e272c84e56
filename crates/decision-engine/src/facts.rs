//! 事实（facts）访问
//!
//! 字段访问器通过点号路径读取事实数据，路径不存在时返回 `None` 而不是报错。

use serde::Serialize;
use serde_json::Value;
use std::ops::Deref;

/// 可按路径读取字段的事实数据
pub trait FactSource {
    /// 获取字段值（支持点号分隔的路径，如 "user.profile.age"）
    fn lookup(&self, path: &str) -> Option<&Value>;
}

impl FactSource for Value {
    fn lookup(&self, path: &str) -> Option<&Value> {
        resolve_path(self, path)
    }
}

impl<T: FactSource + ?Sized> FactSource for &T {
    fn lookup(&self, path: &str) -> Option<&Value> {
        (**self).lookup(path)
    }
}

/// 沿点号路径逐级取值
///
/// 对象按键名访问，数组按数字下标访问（如 "items.0.name"），
/// 其他类型或缺失的键一律返回 `None`。
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;

    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// 强类型事实快照
///
/// 持有原始值以及一次性生成的 JSON 视图，条件既可以直接读取强类型字段，
/// 也可以通过字段访问器按路径读取。
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    value: T,
    view: Value,
}

impl<T: Serialize> Snapshot<T> {
    pub fn new(value: T) -> Result<Self, serde_json::Error> {
        let view = serde_json::to_value(&value)?;
        Ok(Self { value, view })
    }
}

impl<T> Snapshot<T> {
    /// 获取 JSON 视图
    pub fn view(&self) -> &Value {
        &self.view
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> FactSource for Snapshot<T> {
    fn lookup(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.view, path)
    }
}

impl<T: Serialize> Serialize for Snapshot<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}
