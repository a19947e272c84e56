//! 配置管理模块
//!
//! 分层加载配置：`.env`、配置文件、环境变量依次覆盖。
//! `AppConfig<X>` 的 `engine` 段由使用方决定具体类型。

use crate::observability::ObservabilityConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// 环境变量前缀（DECISION_ENGINE__ACTIVATION -> engine.activation）
pub const ENV_PREFIX: &str = "DECISION";

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "X: Deserialize<'de> + Default"))]
pub struct AppConfig<X> {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub engine: X,
}

impl<X: Default> Default for AppConfig<X> {
    fn default() -> Self {
        Self {
            service_name: "decision-engine".to_string(),
            environment: "development".to_string(),
            observability: ObservabilityConfig::default(),
            engine: X::default(),
        }
    }
}

impl<X: DeserializeOwned + Default> AppConfig<X> {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. .env 文件（仅填充尚未设置的环境变量）
    /// 2. config/default.toml
    /// 3. config/{environment}.toml（环境由 DECISION_ENV 指定，默认 development）
    /// 4. config/{service_name}.toml
    /// 5. 环境变量（DECISION_ 前缀，`__` 分隔层级）
    ///
    /// 配置目录可通过 CONFIG_DIR 指定。
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        ConfigLoader::new(service_name).load()
    }

    pub fn loader(service_name: &str) -> ConfigLoader {
        ConfigLoader::new(service_name)
    }
}

impl<X> AppConfig<X> {
    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// 配置加载器
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    service_name: String,
    config_dir: PathBuf,
    environment: String,
    list_keys: Vec<String>,
    load_dotenv: bool,
}

impl ConfigLoader {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            config_dir: std::env::var("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config")),
            environment: std::env::var(format!("{}_ENV", ENV_PREFIX))
                .unwrap_or_else(|_| "development".to_string()),
            list_keys: Vec::new(),
            load_dotenv: true,
        }
    }

    pub fn config_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// 声明以逗号分隔解析为列表的键（如 `engine.include_tags`）
    pub fn list_key(mut self, key: impl Into<String>) -> Self {
        self.list_keys.push(key.into());
        self
    }

    /// 跳过 .env 文件
    pub fn without_dotenv(mut self) -> Self {
        self.load_dotenv = false;
        self
    }

    pub fn load<X: DeserializeOwned + Default>(self) -> Result<AppConfig<X>, ConfigError> {
        if self.load_dotenv {
            dotenvy::dotenv().ok();
        }

        let dir = &self.config_dir;
        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);
        if !self.list_keys.is_empty() {
            environment = environment.list_separator(",");
            for key in &self.list_keys {
                environment = environment.with_list_parse_key(key);
            }
        }

        Config::builder()
            .set_default("service_name", self.service_name.clone())?
            .set_default("environment", self.environment.clone())?
            .set_default("observability.service_name", self.service_name.clone())?
            .add_source(File::from(dir.join("default.toml")).required(false))
            .add_source(File::from(dir.join(format!("{}.toml", self.environment))).required(false))
            .add_source(File::from(dir.join(format!("{}.toml", self.service_name))).required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}
