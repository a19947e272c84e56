//! 引擎配置
//!
//! `engine` 段即默认的 [`RunOptions`]，可由配置文件或环境变量覆盖：
//!
//! ```toml
//! [engine]
//! activation = "first"
//! merge_strategy = "deep"
//! exclude_tags = ["beta"]
//! ```
//!
//! 环境变量示例：`DECISION_ENGINE__ROLLBACK_ON_ERROR=true`、
//! `DECISION_ENGINE__INCLUDE_TAGS=core,kyc`。

use crate::options::RunOptions;
use decision_shared::config::{AppConfig, ConfigLoader};

pub use ::config::ConfigError;

pub type EngineConfig = AppConfig<RunOptions>;

/// 标签过滤以逗号分隔的列表形式出现在环境变量中
const LIST_KEYS: [&str; 2] = ["engine.include_tags", "engine.exclude_tags"];

/// 按默认分层规则加载引擎配置
pub fn load(service_name: &str) -> Result<EngineConfig, ConfigError> {
    with_list_keys(AppConfig::<RunOptions>::loader(service_name)).load()
}

/// 为自定义加载器补充标签列表解析
pub fn with_list_keys(loader: ConfigLoader) -> ConfigLoader {
    LIST_KEYS.iter().fold(loader, |loader, key| loader.list_key(*key))
}
