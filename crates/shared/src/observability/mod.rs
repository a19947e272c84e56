//! 统一可观测性模块
//!
//! 日志、分布式追踪和指标导出的统一初始化入口。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识追踪和指标的来源
    pub service_name: String,

    /// OpenTelemetry OTLP 端点，为空时禁用分布式追踪导出
    pub otlp_endpoint: Option<String>,

    /// Prometheus 指标导出端口，为空时不启动导出
    pub metrics_port: Option<u16>,

    /// 日志级别（RUST_LOG 优先）
    pub log_level: String,

    /// JSON 日志
    pub json_logs: bool,

    /// 追踪采样比例（0.0 ~ 1.0），小于 1 时按 trace id 采样
    pub trace_sample_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "decision-engine".to_string(),
            otlp_endpoint: None,
            metrics_port: None,
            log_level: "info".to_string(),
            json_logs: false,
            trace_sample_ratio: 1.0,
        }
    }
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    pub fn with_trace_sample_ratio(mut self, ratio: f64) -> Self {
        self.trace_sample_ratio = ratio.clamp(0.0, 1.0);
        self
    }
}

/// 可观测性资源守卫
///
/// Drop 时关闭追踪 provider 并刷新待发送的 span。
pub struct ObservabilityGuard {
    _tracing_guard: Option<tracing::TracingGuard>,
}

impl ObservabilityGuard {
    /// 空 Guard（测试或禁用可观测性时使用）
    pub fn empty() -> Self {
        Self {
            _tracing_guard: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self._tracing_guard.is_some() {
            info!("正在关闭可观测性组件");
        }
    }
}

/// 统一初始化可观测性
///
/// 先初始化 tracing（日志和追踪），再安装 Prometheus 指标导出。
/// 配置了 OTLP 端点或指标端口时需要在 tokio 运行时内调用。
///
/// ```ignore
/// let config: EngineConfig = decision_engine::config::load("pricing")?;
/// let _guard = decision_shared::observability::init(&config.observability)?;
/// ```
pub fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config)?;
    metrics::init(config)?;

    info!(
        service = %config.service_name,
        metrics_port = ?config.metrics_port,
        otlp_endpoint = ?config.otlp_endpoint,
        "可观测性初始化完成"
    );

    Ok(ObservabilityGuard {
        _tracing_guard: Some(tracing_guard),
    })
}
