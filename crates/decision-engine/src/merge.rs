//! 效果补丁合并

use crate::options::MergeStrategy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// 动作返回的部分效果
pub type Patch = Value;

/// 将补丁合并到强类型效果对象
///
/// 先转换为 JSON 合并，再反序列化回原类型；任一步失败时效果对象保持不变。
pub(crate) fn apply_patch<E>(effects: &mut E, patch: Patch, strategy: MergeStrategy) -> Result<(), String>
where
    E: Serialize + DeserializeOwned,
{
    let mut target = serde_json::to_value(&*effects).map_err(|e| format!("效果序列化失败: {}", e))?;
    merge_value(&mut target, patch, strategy)?;
    *effects = serde_json::from_value(target).map_err(|e| format!("补丁与效果类型不兼容: {}", e))?;
    Ok(())
}

/// 按策略把补丁合并到 JSON 值
pub fn merge_value(target: &mut Value, patch: Patch, strategy: MergeStrategy) -> Result<(), String> {
    let patch = match patch {
        Value::Object(map) => map,
        other => return Err(format!("补丁必须是对象，实际为 {}", other)),
    };

    let target = match target {
        Value::Object(map) => map,
        other => return Err(format!("效果必须是对象才能合并补丁，实际为 {}", other)),
    };

    match strategy {
        MergeStrategy::Assign => {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        MergeStrategy::Deep => deep_merge(target, patch),
    }

    Ok(())
}

/// 对象递归合并，其他值（包括数组）整体覆盖
fn deep_merge(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Object(nested) => {
                let slot = target
                    .entry(key)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(inner) = slot {
                    deep_merge(inner, nested);
                }
            }
            other => {
                target.insert(key, other);
            }
        }
    }
}
