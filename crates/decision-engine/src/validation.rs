//! 事实 / 效果校验
//!
//! 校验器是返回 `anyhow::Result<()>` 的函数，引擎在运行前校验事实，
//! 在实例化效果后和运行结束时校验效果。本模块把 `validator` crate
//! 的 [`Validate`] 适配成校验器。
//!
//! ```ignore
//! #[derive(Serialize, Deserialize, Validate)]
//! struct Applicant {
//!     #[validate(range(min = 0, max = 150, message = "年龄超出范围"))]
//!     age: u32,
//! }
//!
//! let builder = RulesetBuilder::<Applicant, Decision>::new("kyc")
//!     .validate_facts(validation::validated());
//! ```

use crate::facts::Snapshot;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use validator::Validate;

/// 校验器
pub type Validator<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// 将任意闭包包装成校验器
pub fn from_fn<T, V>(validate: V) -> Validator<T>
where
    V: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(validate)
}

/// 基于 `Validate` 派生规则的校验器
pub fn validated<T: Validate + 'static>() -> Validator<T> {
    Arc::new(|value: &T| value.validate().map_err(anyhow::Error::from))
}

/// 校验快照中的强类型值
pub fn validated_snapshot<T: Validate + 'static>() -> Validator<Snapshot<T>> {
    Arc::new(|snapshot: &Snapshot<T>| {
        let value: &T = snapshot;
        value.validate().map_err(anyhow::Error::from)
    })
}

/// 先将 JSON 解析为 `T`，再执行 `Validate` 校验
///
/// 适用于事实或效果本身是 `serde_json::Value` 的规则集。
pub fn parsed<T>() -> Validator<Value>
where
    T: DeserializeOwned + Validate + 'static,
{
    Arc::new(|value: &Value| {
        let parsed: T = serde_json::from_value(value.clone())
            .map_err(|e| anyhow::anyhow!("结构不匹配: {}", e))?;
        parsed.validate().map_err(anyhow::Error::from)
    })
}
