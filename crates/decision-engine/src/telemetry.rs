//! 遥测适配
//!
//! 引擎在运行、规则、条件和动作四个层级调用 [`Telemetry::start_span`]，
//! 未配置适配器时只做一次空值判断，不产生额外开销。
//!
//! [`TracingTelemetry`] 是内置适配器：基于 `tracing` span 记录层级关系，
//! 并通过 `metrics` 上报 span 数量、异常数量和耗时。

use std::fmt;
use std::time::Instant;
use tracing::{Span, error, info_span};

/// Span 所在层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Run,
    Rule,
    Condition,
    Action,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Rule => "rule",
            Self::Condition => "condition",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span 属性
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanAttributes {
    pub ruleset: String,
    pub rule_id: Option<String>,
    pub condition: Option<String>,
}

impl SpanAttributes {
    pub fn new(ruleset: impl Into<String>) -> Self {
        Self {
            ruleset: ruleset.into(),
            ..Default::default()
        }
    }

    pub fn rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn condition(mut self, label: impl Into<String>) -> Self {
        self.condition = Some(label.into());
        self
    }
}

/// 遥测适配器
#[cfg_attr(test, mockall::automock)]
pub trait Telemetry: Send + Sync {
    fn start_span(&self, kind: SpanKind, attributes: SpanAttributes) -> Box<dyn ActiveSpan>;
}

/// 进行中的 span
///
/// 异步运行时 span 会跨越 await 点，因此要求 `Send`。
pub trait ActiveSpan: Send {
    /// 在重新抛出错误之前记录异常
    fn record_exception(&mut self, message: &str);

    fn end(self: Box<Self>);
}

/// 基于 tracing + metrics 的遥测适配器
#[derive(Debug, Clone, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self::describe_metrics();
        Self
    }

    fn describe_metrics() {
        metrics::describe_counter!(
            "decision_engine_spans_total",
            "Total number of decision engine spans"
        );
        metrics::describe_counter!(
            "decision_engine_span_errors_total",
            "Total number of decision engine spans that recorded an exception"
        );
        metrics::describe_histogram!(
            "decision_engine_span_duration_seconds",
            "Decision engine span duration in seconds"
        );
    }
}

impl Telemetry for TracingTelemetry {
    fn start_span(&self, kind: SpanKind, attributes: SpanAttributes) -> Box<dyn ActiveSpan> {
        let span = info_span!(
            "decision_engine",
            kind = kind.as_str(),
            ruleset = %attributes.ruleset,
            rule_id = attributes.rule_id.as_deref().unwrap_or_default(),
            condition = attributes.condition.as_deref().unwrap_or_default(),
        );

        Box::new(TracingSpan {
            span,
            kind,
            ruleset: attributes.ruleset,
            started: Instant::now(),
            failed: false,
        })
    }
}

struct TracingSpan {
    span: Span,
    kind: SpanKind,
    ruleset: String,
    started: Instant,
    failed: bool,
}

impl ActiveSpan for TracingSpan {
    fn record_exception(&mut self, message: &str) {
        self.failed = true;
        self.span.in_scope(|| {
            error!(exception = message, "决策引擎执行异常");
        });
        metrics::counter!(
            "decision_engine_span_errors_total",
            "kind" => self.kind.as_str(),
            "ruleset" => self.ruleset.clone()
        )
        .increment(1);
    }

    fn end(self: Box<Self>) {
        let status = if self.failed { "error" } else { "ok" };
        metrics::counter!(
            "decision_engine_spans_total",
            "kind" => self.kind.as_str(),
            "ruleset" => self.ruleset.clone(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "decision_engine_span_duration_seconds",
            "kind" => self.kind.as_str()
        )
        .record(self.started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_attributes_builder() {
        let attrs = SpanAttributes::new("pricing").rule("vip").condition("tier == \"gold\"");
        assert_eq!(attrs.ruleset, "pricing");
        assert_eq!(attrs.rule_id.as_deref(), Some("vip"));
        assert_eq!(attrs.condition.as_deref(), Some("tier == \"gold\""));
    }

    #[test]
    fn test_tracing_telemetry_without_recorder() {
        // 未安装 metrics recorder / subscriber 时应静默运行
        let telemetry = TracingTelemetry::new();
        let mut span = telemetry.start_span(SpanKind::Action, SpanAttributes::new("pricing"));
        span.record_exception("boom");
        span.end();
    }

    #[test]
    fn test_span_kind_display() {
        assert_eq!(SpanKind::Condition.to_string(), "condition");
    }
}
