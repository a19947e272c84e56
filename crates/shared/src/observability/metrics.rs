//! Prometheus 指标导出
//!
//! 基于 metrics-exporter-prometheus，在独立端口暴露 `/metrics` 供 Prometheus 抓取。
//! 决策引擎的指标由 `TracingTelemetry` 通过 metrics 宏上报。

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use super::ObservabilityConfig;

/// 安装 Prometheus recorder 并启动导出端点
///
/// 未配置端口时不做任何事，指标宏调用保持空操作。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let Some(port) = config.metrics_port else {
        return Ok(());
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!("Metrics exporter listening on {}", addr);

    metrics::counter!("service_starts_total", "service" => config.service_name.clone()).increment(1);
    Ok(())
}
